use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host, SampleFormat, StreamConfig};
use voxloop_foundation::AudioError;

/// Host/device acquisition and stream-config negotiation.
pub struct DeviceManager {
    host: Host,
}

impl DeviceManager {
    pub fn new() -> Result<Self, AudioError> {
        Ok(Self {
            host: cpal::default_host(),
        })
    }

    /// Open the named input device, or the host default when `name` is None.
    /// Fails fast with `DeviceNotFound`; the lifecycle layer surfaces this to
    /// the caller of `start()`.
    pub fn open_input(&self, name: Option<&str>) -> Result<Device, AudioError> {
        match name {
            Some(wanted) => {
                let mut inputs = self.host.input_devices().map_err(|e| AudioError::Fatal(
                    format!("cannot enumerate input devices: {e}"),
                ))?;
                inputs
                    .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                    .ok_or_else(|| AudioError::DeviceNotFound {
                        name: Some(wanted.to_string()),
                    })
            }
            None => self
                .host
                .default_input_device()
                .ok_or(AudioError::DeviceNotFound { name: None }),
        }
    }

    pub fn open_output(&self) -> Result<Device, AudioError> {
        self.host
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)
    }

    /// Prefer the device default config; fall back to the first supported
    /// range at its max rate.
    pub fn negotiate_input_config(
        &self,
        device: &Device,
    ) -> Result<(StreamConfig, SampleFormat), AudioError> {
        if let Ok(default_config) = device.default_input_config() {
            return Ok((
                StreamConfig {
                    channels: default_config.channels(),
                    sample_rate: default_config.sample_rate(),
                    buffer_size: cpal::BufferSize::Default,
                },
                default_config.sample_format(),
            ));
        }

        let configs = device.supported_input_configs()?;
        if let Some(config) = configs.into_iter().next() {
            let format = config.sample_format();
            return Ok((config.with_max_sample_rate().into(), format));
        }

        Err(AudioError::FormatNotSupported {
            format: "no supported input formats".to_string(),
        })
    }

    pub fn negotiate_output_config(
        &self,
        device: &Device,
    ) -> Result<(StreamConfig, SampleFormat), AudioError> {
        if let Ok(default_config) = device.default_output_config() {
            return Ok((
                StreamConfig {
                    channels: default_config.channels(),
                    sample_rate: default_config.sample_rate(),
                    buffer_size: cpal::BufferSize::Default,
                },
                default_config.sample_format(),
            ));
        }

        let configs = device.supported_output_configs()?;
        if let Some(config) = configs.into_iter().next() {
            let format = config.sample_format();
            return Ok((config.with_max_sample_rate().into(), format));
        }

        Err(AudioError::FormatNotSupported {
            format: "no supported output formats".to_string(),
        })
    }
}
