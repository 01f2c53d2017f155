//! i2 CLI entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Load configuration**: [`client::ClientConfig::from_env`] (`I2_URL`,
//!    `I2_ACCESS_KEY`, `I2_VERBOSE`, `I2_STRICT_VALIDATION`, `I2_LOG_FORMAT`).
//! 2. **Build the client**: [`client::Client::from_config`] also builds the
//!    stderr `tracing` sink from `I2_VERBOSE` and `I2_LOG_FORMAT`; no global
//!    subscriber is installed.
//! 3. **Run one batch**: every non-empty stdin line is one input (parsed as
//!    JSON, or sent as a plain string when it is not JSON). All inputs go
//!    through a single session.
//! 4. **Report**: one JSON outcome per line on stdout, in input order.
//!
//! Exits non-zero when the session itself fails; per-item failures are
//! reported in the output and do not change the exit status.

use std::io::{BufRead, Write};

use anyhow::Context;
use client::{Client, ClientConfig};
use protocol::Payload;
use serde_json::Value;

fn main() -> anyhow::Result<()> {
    let config = ClientConfig::from_env()?;
    let client = Client::from_config(&config);

    let items = read_inputs(std::io::stdin().lock())?;
    let outcomes = client
        .inference(items, None, None)
        .with_context(|| format!("inference against {} failed", client.address()))?;

    let mut stdout = std::io::stdout().lock();
    for outcome in outcomes {
        serde_json::to_writer(&mut stdout, &outcome)?;
        writeln!(stdout)?;
    }
    Ok(())
}

fn read_inputs(input: impl BufRead) -> anyhow::Result<Vec<Payload>> {
    let mut items = Vec::new();
    for line in input.lines() {
        let line = line.context("failed to read stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value =
            serde_json::from_str(line).unwrap_or_else(|_| Value::String(line.to_owned()));
        items.push(Payload::Json(value));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_read_inputs_parses_json_or_falls_back_to_text() {
        let input = "{\"a\": 1}\n\n42\nhello world\n";
        let items = read_inputs(input.as_bytes()).unwrap();
        assert_eq!(
            items,
            vec![
                Payload::Json(json!({"a": 1})),
                Payload::Json(json!(42)),
                Payload::Json(json!("hello world")),
            ]
        );
    }
}
