pub mod command_sensor;

pub use command_sensor::CommandSensor;
