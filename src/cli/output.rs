//! Output formatting for CLI commands.

use serde::{Deserialize, Serialize};

use crate::cli::args::{OutputFormat, ProofreaderArgs};
use crate::error::Result;
use crate::session::SessionStats;

/// Summary of a finished serving session.
#[derive(Debug, Serialize)]
pub struct ServeSummary {
    pub session_id: String,
    pub address: String,
    pub corrections: usize,
    pub stats: SessionStats,
    pub duration_ms: u64,
}

/// Lookup table received by a simulated proofreader.
#[derive(Debug, Serialize, Deserialize)]
pub struct SimulationResult {
    pub fragments: Vec<u64>,
    pub segments: Vec<u64>,
    pub segment_count: usize,
    pub duration_ms: u64,
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize>(
    message: &str,
    result: &T,
    args: &ProofreaderArgs,
) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

fn output_human<T: Serialize>(message: &str, result: &T, args: &ProofreaderArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
        println!();
    }

    let value = serde_json::to_value(result)?;
    if let (Some(fragments), Some(segments)) = (
        value.get("fragments").and_then(|f| f.as_array()),
        value.get("segments").and_then(|s| s.as_array()),
    ) {
        println!("{:>12}  {:>12}", "fragment", "segment");
        for (fragment, segment) in fragments.iter().zip(segments) {
            println!("{:>12}  {:>12}", fragment.to_string(), segment.to_string());
        }
        if let Some(obj) = value.as_object() {
            for (key, field) in obj {
                if key != "fragments" && key != "segments" {
                    println!("{}: {}", format_key(key), field);
                }
            }
        }
        return Ok(());
    }

    output_generic_human(&value, 0);
    Ok(())
}

fn output_generic_human(value: &serde_json::Value, indent: usize) {
    let pad = "  ".repeat(indent);
    match value {
        serde_json::Value::Object(obj) => {
            for (key, field) in obj {
                if field.is_object() {
                    println!("{pad}{}:", format_key(key));
                    output_generic_human(field, indent + 1);
                } else {
                    println!("{pad}{}: {}", format_key(key), field);
                }
            }
        }
        other => println!("{pad}{other}"),
    }
}

/// `segment_count` -> `Segment count`.
fn format_key(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => spaced,
    }
}

fn output_json<T: Serialize>(result: &T, args: &ProofreaderArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{json}");
    Ok(())
}
