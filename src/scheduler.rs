pub mod daemon;

pub use daemon::spawn_reconcile_daemon;
