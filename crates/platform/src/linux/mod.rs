mod hardware;
mod proc_stat;

pub use hardware::LinuxHardware;
pub use proc_stat::{parse_proc_stat, ProcStat};
