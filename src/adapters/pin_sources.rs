use tracing::debug;

use crate::error::{DeviceError, FidoslotError, FidoslotResult};
use crate::model::Pin;
use crate::ports::PinSource;

/// PIN supplied up front, e.g. from the command line or an environment
/// variable. Without one, any PIN request fails with `PinRequired`.
#[derive(Debug, Default)]
pub struct StaticPin(Option<Pin>);

impl StaticPin {
    pub fn new(pin: Option<Pin>) -> Self {
        Self(pin)
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl PinSource for StaticPin {
    fn request_pin(&mut self, prompt: &str) -> FidoslotResult<Pin> {
        debug!("PIN requested: {}", prompt);
        self.0
            .clone()
            .ok_or(FidoslotError::Device(DeviceError::PinRequired))
    }
}

/// Prompt on the controlling terminal without echo
#[derive(Debug, Default)]
pub struct TerminalPin;

impl PinSource for TerminalPin {
    fn request_pin(&mut self, prompt: &str) -> FidoslotResult<Pin> {
        let entered = zeroize::Zeroizing::new(rpassword::prompt_password(format!("{prompt}: "))?);
        Ok(entered.parse()?)
    }
}
