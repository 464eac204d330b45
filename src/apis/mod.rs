pub mod metrograph;
