//! Command execution.

use crate::Commands;
use colored::Colorize;
use rstdt_client::{Client, ClientError};
use rstdt_protocol::{
    decode_entries, ResponseFrame, Record, AMENITIES_LOOKUP, PRICE_LOOKUP, RATING_LOOKUP,
};

/// Executes a command and returns the formatted output.
///
/// `client` is only consulted by commands that need a server.
pub async fn execute(
    client: Option<&Client>,
    cmd: Commands,
) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Search {
            resource,
            min,
            max,
            json,
        } => {
            let client = client.ok_or(ClientError::NotConnected)?;
            let records = client.search(resource, min, max).await?;
            if json {
                return Ok(serde_json::to_string_pretty(&records)?);
            }
            if records.is_empty() {
                return Ok("No matching records".yellow().to_string());
            }
            Ok(format_records(&records))
        }

        Commands::Raw { opcode, resource } => {
            let client = client.ok_or(ClientError::NotConnected)?;
            let body = client.raw(opcode, resource).await?;
            if body.is_empty() {
                Ok(format!("{} (0 bytes)", "Empty response".yellow()))
            } else {
                Ok(format!("{} ({} bytes)", hex::encode(&body), body.len()))
            }
        }

        Commands::Decode { hex, framed } => decode_hex(&hex, framed),

        Commands::Tables => Ok(format_tables()),
    }
}

/// Formats one decoded record.
pub fn format_record(record: &Record) -> String {
    format!(
        "ID: {}, Price: ${}, Rating: {}/5, Amenities: {:#06b}",
        record.id, record.price, record.rating, record.amenities
    )
}

fn format_records(records: &[Record]) -> String {
    records
        .iter()
        .map(format_record)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decodes a hex-encoded response body (or full frame when `framed`).
pub fn decode_hex(input: &str, framed: bool) -> Result<String, Box<dyn std::error::Error>> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(cleaned.trim_start_matches("0x"))?;

    let body = if framed {
        let mut buf = bytes::BytesMut::from(&bytes[..]);
        match ResponseFrame::decode(&mut buf)? {
            Some(body) => body.to_vec(),
            None => return Err("incomplete frame: length prefix exceeds input".into()),
        }
    } else {
        bytes
    };

    let records = decode_entries(&body)?;
    if records.is_empty() {
        return Ok("No records".yellow().to_string());
    }
    Ok(format_records(&records))
}

/// Renders the lookup tables, one row per 2-bit index.
pub fn format_tables() -> String {
    let mut output = format!(
        "{}\n",
        format!("{:<6} {:>6} {:>7} {:>10}", "Index", "Price", "Rating", "Amenities").bold()
    );
    for index in 0..4 {
        output.push_str(&format!(
            "{:<6} {:>6} {:>7} {:>10}\n",
            index,
            format!("<={}", PRICE_LOOKUP[index]),
            RATING_LOOKUP[index],
            format!("{:#06b}", AMENITIES_LOOKUP[index])
        ));
    }
    output.push_str(&"Prices above the last bound use index 3.".dimmed().to_string());
    output
}
