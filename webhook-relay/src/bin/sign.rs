//! Ledger Sign - produce signed test deliveries.
//!
//! Signs a WhatsApp webhook payload with the app secret the same way Meta
//! does, and prints the compact body, the `X-Hub-Signature-256` value and a
//! ready-to-run `curl` command.
//!
//! # Usage
//!
//! ```bash
//! # Built-in sample text message
//! ledger-sign --secret my-app-secret
//!
//! # Custom payload against a deployed relay
//! ledger-sign --payload event.json --url https://relay.example.com/webhooks/whatsapp
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{json, Value};

use ledger_relay::web::{sign, SIGNATURE_HEADER, WEBHOOK_PATH};

/// Sign a WhatsApp webhook payload for local testing.
#[derive(Parser, Debug)]
#[command(name = "ledger-sign")]
#[command(about = "Signs WhatsApp webhook payloads with the app secret")]
struct Args {
    /// App secret used to sign the payload.
    #[arg(long, env = "META_APP_SECRET", hide_env_values = true)]
    secret: String,

    /// JSON payload file. Defaults to a sample text message.
    #[arg(long)]
    payload: Option<PathBuf>,

    /// Webhook URL used in the printed curl command.
    #[arg(long, default_value_t = format!("http://localhost:8080{}", WEBHOOK_PATH))]
    url: String,

    /// Phone number id used in the sample payload.
    #[arg(long, default_value = "1234567890")]
    phone_number_id: String,
}

fn sample_payload(phone_number_id: &str) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "123456",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": phone_number_id,
                        "phone_number_id": phone_number_id
                    },
                    "contacts": [{
                        "profile": {"name": "Test User"},
                        "wa_id": "5511987654321"
                    }],
                    "messages": [{
                        "from": "5511987654321",
                        "id": "msg_123",
                        "timestamp": "1234567890",
                        "type": "text",
                        "text": {"body": "Hola, prueba de mensaje"}
                    }]
                }
            }]
        }]
    })
}

/// Quote a string for a POSIX shell.
fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let payload = match &args.payload {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str::<Value>(&raw)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?
        }
        None => sample_payload(&args.phone_number_id),
    };

    // The signature covers these exact bytes.
    let body = serde_json::to_string(&payload).context("Failed to serialize payload")?;
    let signature = sign(body.as_bytes(), &args.secret).context("Failed to sign payload")?;

    println!("Payload:");
    println!("{}", body);
    println!();
    println!("Signature:");
    println!("{}", signature);
    println!();
    println!("curl:");
    println!(
        "curl -X POST {} -H {} -H {} -d {}",
        shell_quote(&args.url),
        shell_quote("Content-Type: application/json"),
        shell_quote(&format!("{}: {}", SIGNATURE_HEADER, signature)),
        shell_quote(&body)
    );

    Ok(())
}
