mod favorite;
mod helpers;
mod log;
mod person;
mod transfer;
mod weight;

pub(crate) use favorite::{cmd_fav_list, cmd_fav_toggle, cmd_recent};
pub(crate) use log::{LogArgs, cmd_dates, cmd_day, cmd_entry_delete, cmd_log};
pub(crate) use person::{cmd_person_add, cmd_person_delete, cmd_person_list};
pub(crate) use transfer::{cmd_export, cmd_import, cmd_seed, cmd_wipe};
pub(crate) use weight::{cmd_weight_delete, cmd_weight_history, cmd_weight_log, cmd_weight_range};
