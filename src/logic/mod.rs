mod passphrase;

pub use passphrase::{encode_passphrase, passphrase_len};
