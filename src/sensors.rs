use async_trait::async_trait;

use crate::error::Result;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TemperatureSensor: Send + Sync {
    /// Reads the current temperature in Celsius.
    async fn read_temperature(&self) -> Result<f32>;

    fn key(&self) -> String;
}
