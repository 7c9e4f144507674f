// crates/trustgate-cli/src/commands/sign.rs
//
// `trustgate sign`: produce a tagged wire message.
//
// This is the legitimate sender side of the canonical byte contract; the
// output can be piped into `trustgate check` or wrapped as an ingress frame
// for the daemon.

use clap::Args;
use serde_json::{json, Value};
use trustgate_core::{BrokerId, MessageAuthenticator, MessageBody, TrustGateError};

/// Arguments for `trustgate sign`.
#[derive(Debug, Args)]
pub struct SignCmd {
    /// Shared secret for message tags.
    #[arg(long, env = "TRUSTGATE_SECRET", hide_env_values = true)]
    pub secret: String,

    /// Broker claiming to have signed the message.
    #[arg(long)]
    pub signer: String,

    /// Publishing client id.
    #[arg(long)]
    pub client: String,

    /// Payload. Parsed as JSON when possible, otherwise sent as a string.
    #[arg(long)]
    pub payload: String,

    /// Comma-separated signer chain. Defaults to the signer alone.
    #[arg(long, value_delimiter = ',')]
    pub chain: Vec<String>,

    /// Wrap the message as a daemon ingress frame on this topic.
    #[arg(long)]
    pub frame: Option<String>,
}

/// Build the output line for `cmd`.
pub fn sign_line(cmd: &SignCmd) -> Result<String, TrustGateError> {
    let auth = MessageAuthenticator::new(cmd.secret.as_bytes())?;
    let payload = serde_json::from_str::<Value>(&cmd.payload)
        .unwrap_or_else(|_| Value::String(cmd.payload.clone()));
    let chain: Vec<BrokerId> = if cmd.chain.is_empty() {
        vec![BrokerId::new(cmd.signer.as_str())]
    } else {
        cmd.chain.iter().map(|b| BrokerId::new(b.trim())).collect()
    };

    let signed = auth.sign(MessageBody::new(cmd.signer.as_str(), cmd.client.as_str(), payload, chain))?;
    let wire = String::from_utf8(signed.to_wire().to_bytes()?)
        .map_err(|e| TrustGateError::Serialization(e.to_string()))?;

    match &cmd.frame {
        Some(topic) => Ok(json!({"topic": topic, "payload": wire}).to_string()),
        None => Ok(wire),
    }
}

/// Run the sign command.
pub fn run(cmd: &SignCmd) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", sign_line(cmd)?);
    Ok(())
}
