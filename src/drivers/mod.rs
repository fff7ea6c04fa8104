//! Bus-level drivers shared by the sensor drivers.

pub mod power_bus;
