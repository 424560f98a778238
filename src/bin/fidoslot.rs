use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::io::{self, Read};
use std::path::PathBuf;
use tracing::error;
use zeroize::Zeroizing;

use fidoslot::{
    adapters::{StaticPin, TerminalPin},
    api::{self, AuthenticatorSelector, CredentialAlgorithm, EnrollmentPolicy, Pin, VolumeKey},
    ports::PinSource,
    EnrollConfig, FidoslotError, UnlockConfig,
};

#[derive(Parser, Debug)]
#[command(name = "fidoslot")]
#[command(about = "Bind FIDO2 hmac-secret tokens to encrypted volume keyslots", version)]
pub struct Cli {
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Enroll a FIDO2 token; reads the volume key as hex from stdin
    Enroll {
        /// Volume header file
        #[arg(long)]
        header: PathBuf,

        /// Software authenticator state file
        #[arg(long)]
        authenticator: PathBuf,

        /// Authenticator to use ("auto" picks the first one)
        #[arg(long, default_value = "auto")]
        device: String,

        /// Require the clientPin
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        pin_required: bool,

        /// Require user presence (touch)
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        up_required: bool,

        /// Require user verification
        #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
        uv_required: bool,

        /// Credential algorithm
        #[arg(long, default_value = "es256")]
        algorithm: AlgorithmArg,

        /// Token PIN. Prompted for if needed and not given
        #[arg(long)]
        pin: Option<String>,
    },

    /// Recover the volume key with an enrolled FIDO2 token; prints it as hex
    Unlock {
        /// Volume header file
        #[arg(long)]
        header: PathBuf,

        /// Software authenticator state file
        #[arg(long)]
        authenticator: PathBuf,

        /// Authenticator to use ("auto" picks the first one)
        #[arg(long, default_value = "auto")]
        device: String,

        /// Token PIN. Prompted for if needed and not given
        #[arg(long)]
        pin: Option<String>,
    },

    /// List FIDO2 tokens in a volume header
    Tokens {
        /// Volume header file
        #[arg(long)]
        header: PathBuf,
    },

    /// Create an empty volume header file
    InitHeader {
        #[arg(long)]
        header: PathBuf,

        /// Volume UUID. Random if not given
        #[arg(long)]
        uuid: Option<String>,

        /// Device name shown to the user
        #[arg(long, default_value = "cryptdata")]
        name: String,
    },

    /// Create a software authenticator state file
    InitAuthenticator {
        #[arg(long)]
        authenticator: PathBuf,

        #[arg(long, default_value = "soft-fido2")]
        name: String,

        /// Configure a clientPin
        #[arg(long)]
        pin: Option<String>,

        /// Support built-in user verification
        #[arg(long)]
        user_verification: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AlgorithmArg {
    Es256,
    Rs256,
    Eddsa,
}

impl From<AlgorithmArg> for CredentialAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Es256 => CredentialAlgorithm::Es256,
            AlgorithmArg::Rs256 => CredentialAlgorithm::Rs256,
            AlgorithmArg::Eddsa => CredentialAlgorithm::EdDsa,
        }
    }
}

fn pin_source(pin: Option<String>) -> anyhow::Result<Box<dyn PinSource>> {
    Ok(match pin {
        Some(pin) => {
            let pin = Zeroizing::new(pin);
            Box::new(StaticPin::new(Some(
                pin.parse::<Pin>().context("invalid PIN")?,
            )))
        }
        None => Box::new(TerminalPin),
    })
}

fn selector(device: &str) -> AuthenticatorSelector {
    match device.parse() {
        Ok(selector) => selector,
        Err(never) => match never {},
    }
}

fn read_volume_key() -> anyhow::Result<VolumeKey> {
    let mut input = Zeroizing::new(String::new());
    io::stdin()
        .read_to_string(&mut input)
        .context("failed to read volume key from stdin")?;
    let bytes = Zeroizing::new(hex::decode(input.trim()).context("volume key is not hex")?);
    Ok(VolumeKey::from_slice(&bytes))
}

/// Point the user at re-running when the token asked for it
fn report(err: FidoslotError) -> anyhow::Error {
    if err.is_retryable() {
        error!("{err}");
        anyhow::Error::new(err).context("token is locked, please re-plug it and try again")
    } else {
        anyhow::Error::new(err)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(cli.verbosity.tracing_level_filter())
        .init();

    match cli.command {
        Commands::Enroll {
            header,
            authenticator,
            device,
            pin_required,
            up_required,
            uv_required,
            algorithm,
            pin,
        } => {
            let config = EnrollConfig {
                selector: selector(&device),
                policy: EnrollmentPolicy::from_requirements(pin_required, up_required, uv_required),
                algorithm: algorithm.into(),
                ..EnrollConfig::default()
            };
            let volume_key = read_volume_key()?;
            let mut pins = pin_source(pin)?;

            let enrollment =
                api::enroll_volume(&header, &authenticator, &volume_key, &config, &mut pins)
                    .map_err(report)
                    .context("failed to enroll FIDO2 token")?;
            println!("{}", enrollment.keyslot);
        }

        Commands::Unlock {
            header,
            authenticator,
            device,
            pin,
        } => {
            let config = UnlockConfig {
                selector: selector(&device),
                ..UnlockConfig::default()
            };
            let mut pins = pin_source(pin)?;

            let unlocked = api::unlock_volume(&header, &authenticator, &config, &mut pins)
                .map_err(report)
                .context("failed to unlock volume with FIDO2 token")?;
            println!("{}", Zeroizing::new(hex::encode(unlocked.volume_key.as_bytes())).as_str());
        }

        Commands::Tokens { header } => {
            let tokens = api::list_volume_tokens(&header).context("failed to read tokens")?;
            for (token_id, record) in tokens {
                let keyslots: Vec<String> = record.keyslots.iter().map(|k| k.to_string()).collect();
                println!(
                    "{}\t{}\tkeyslots={}\tpolicy={}",
                    token_id,
                    record.relying_party_id,
                    keyslots.join(","),
                    record.policy
                );
            }
        }

        Commands::InitHeader { header, uuid, name } => {
            api::init_header(&header, uuid.as_deref(), &name)
                .context("failed to create volume header")?;
        }

        Commands::InitAuthenticator {
            authenticator,
            name,
            pin,
            user_verification,
        } => {
            let pin = pin
                .map(|pin| Zeroizing::new(pin).parse::<Pin>())
                .transpose()
                .context("invalid PIN")?;
            api::init_authenticator(&authenticator, &name, pin, user_verification)
                .context("failed to create software authenticator")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_cmd::Command;

    #[test]
    fn test_cli_version_parameter() {
        let mut cmd = Command::cargo_bin("fidoslot").unwrap();
        let assert = cmd.arg("--version").assert();
        assert.success();
    }

    #[test]
    fn test_cli_rejects_unknown_algorithm() {
        let mut cmd = Command::cargo_bin("fidoslot").unwrap();
        cmd.args([
            "enroll",
            "--header",
            "h.json",
            "--authenticator",
            "a.json",
            "--algorithm",
            "des",
        ])
        .assert()
        .failure();
    }
}
