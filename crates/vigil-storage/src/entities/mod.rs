pub mod acknowledgment;
pub mod alert;
pub mod history_entry;
