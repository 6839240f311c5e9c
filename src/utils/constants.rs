pub const USER_AGENT: &str = concat!("alertsweep/", env!("CARGO_PKG_VERSION"));
