use crate::error::FidoslotResult;
use crate::model::Pin;

/// Capability to obtain a PIN from the user
pub trait PinSource {
    fn request_pin(&mut self, prompt: &str) -> FidoslotResult<Pin>;
}

impl<P: PinSource + ?Sized> PinSource for Box<P> {
    fn request_pin(&mut self, prompt: &str) -> FidoslotResult<Pin> {
        (**self).request_pin(prompt)
    }
}
