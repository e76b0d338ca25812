use std::{process::Stdio, time::Duration};

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use crate::{
    config::SensorCfg,
    error::{Result, RgbError},
    sensors::TemperatureSensor,
};

/// Temperature source backed by an external command such as `sensors`.
///
/// The command is run once per read; its stdout is scanned for the first
/// line containing `label` and the first numeric token after the label is
/// taken as degrees Celsius.
pub struct CommandSensor {
    key: String,
    program: String,
    args: Vec<String>,
    label: String,
    timeout: Duration,
}

impl CommandSensor {
    pub fn from_cfg(cfg: &SensorCfg) -> Self {
        Self {
            key: cfg.id.clone(),
            program: cfg.program.clone(),
            args: cfg.args.clone(),
            label: cfg.label.clone(),
            timeout: Duration::from_millis(cfg.timeout_ms),
        }
    }

    async fn run(&self) -> Result<String> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| RgbError::Timeout {
                what: "sensor command",
                after: self.timeout,
            })?
            .map_err(|e| RgbError::Sensor(format!("failed to run `{}`: {e}", self.program)))?;

        if !output.status.success() {
            return Err(RgbError::Sensor(format!(
                "`{}` exited with {}",
                self.program, output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TemperatureSensor for CommandSensor {
    fn key(&self) -> String {
        self.key.clone()
    }

    async fn read_temperature(&self) -> Result<f32> {
        let stdout = self.run().await?;
        let temp = parse_temperature(&stdout, &self.label).ok_or_else(|| {
            RgbError::Sensor(format!("no `{}` reading in `{}` output", self.label, self.program))
        })?;
        debug!("{} reads {temp:.1}°C", self.key);
        Ok(temp)
    }
}

/// Extracts the reading for `label` from `sensors`-style output.
///
/// ```
/// use thermal_rgbd::temperature_sensors::command_sensor::parse_temperature;
///
/// let out = "k10temp-pci-00c3\nAdapter: PCI adapter\nTctl:         +45.2°C\n";
/// assert_eq!(parse_temperature(out, "Tctl"), Some(45.2));
/// ```
pub fn parse_temperature(output: &str, label: &str) -> Option<f32> {
    output
        .lines()
        .find_map(|line| line.find(label).map(|at| &line[at + label.len()..]))
        .and_then(|rest| {
            rest.split(|c: char| c.is_whitespace() || c == ':')
                .filter(|tok| !tok.is_empty())
                .find_map(parse_token)
        })
}

fn parse_token(token: &str) -> Option<f32> {
    let number = token
        .trim_start_matches('+')
        .trim_end_matches("°C")
        .trim_end_matches('C')
        .trim_end_matches('°');
    number.parse::<f32>().ok().filter(|t| t.is_finite())
}
