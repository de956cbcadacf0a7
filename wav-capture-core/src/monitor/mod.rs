pub mod space_monitor;
