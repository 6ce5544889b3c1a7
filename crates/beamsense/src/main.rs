//
// main.rs
//
// Command-line front end: runs one completion or signature-help request and
// prints the LSP-shaped result as JSON.
//

use std::env;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

use beamsense::config::{parse_config, IntrospectionConfig};
use beamsense::handlers;
use beamsense::introspection::RuntimeTarget;
use beamsense::state::RuntimeServices;

fn print_usage() {
    println!(
        "beamsense {}, completion and signature help from a live BEAM runtime.",
        env!("CARGO_PKG_VERSION")
    );
    print!(
        r#"
Usage: beamsense <complete|signature> <FRAGMENT> [OPTIONS]

FRAGMENT is the source text up to the cursor; use - to read it from stdin.

Available options:

--settings FILE              Read the "introspection" section of a JSON settings file
--node NAME                  Introspect a running node instead of the local installation
--cookie COOKIE              Distribution cookie for --node
--long-names                 Start the probe node with -name instead of -sname
--erl PATH                   Path to the erl executable
--timeout-ms MS              Bound on each runtime call
                             (command-line options override --settings)
--version                    Print the version
--help                       Print this help message

"#
    );
}

enum Request {
    Complete,
    Signature,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut argv = env::args();
    argv.next(); // skip executable name

    let mut request = None;
    let mut fragment = None;
    let mut node = None;
    let mut settings = None;
    let mut erl_path = None;
    let mut cookie = None;
    let mut long_names = false;
    let mut timeout_ms = None;

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--version" => {
                println!("beamsense {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_usage();
                return Ok(());
            }
            "--settings" => {
                settings = Some(PathBuf::from(expect_value(&mut argv, "--settings")?))
            }
            "--node" => node = Some(expect_value(&mut argv, "--node")?),
            "--cookie" => cookie = Some(expect_value(&mut argv, "--cookie")?),
            "--erl" => erl_path = Some(PathBuf::from(expect_value(&mut argv, "--erl")?)),
            "--long-names" => long_names = true,
            "--timeout-ms" => {
                let value = expect_value(&mut argv, "--timeout-ms")?;
                let ms: u64 = value
                    .parse()
                    .with_context(|| format!("Invalid --timeout-ms value: '{value}'"))?;
                timeout_ms = Some(ms);
            }
            "complete" if request.is_none() => request = Some(Request::Complete),
            "signature" if request.is_none() => request = Some(Request::Signature),
            other if request.is_some() && fragment.is_none() => fragment = Some(other.to_string()),
            other => {
                return Err(anyhow!("Unknown argument: '{other}'"));
            }
        }
    }

    let (Some(request), Some(fragment)) = (request, fragment) else {
        print_usage();
        return Ok(());
    };

    env_logger::init();

    let mut config = match settings {
        Some(path) => load_settings(&path)?,
        None => IntrospectionConfig::default(),
    };
    if erl_path.is_some() {
        config.erl_path = erl_path;
    }
    if cookie.is_some() {
        config.cookie = cookie;
    }
    config.long_names |= long_names;
    if let Some(ms) = timeout_ms {
        config.call_timeout_ms = ms;
    }

    let fragment = if fragment == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read fragment from stdin")?;
        buf
    } else {
        fragment
    };

    let target = match node {
        Some(node) => RuntimeTarget::Remote(node),
        None => RuntimeTarget::Local,
    };
    let services = RuntimeServices::from_config(&config)?;

    let json = match request {
        Request::Complete => {
            let items = handlers::completion_items(&services, &fragment, &target).await;
            serde_json::to_string_pretty(&items)?
        }
        Request::Signature => {
            let help = handlers::signature_help(&services, &fragment, &target)
                .await
                .map(|result| result.to_lsp());
            serde_json::to_string_pretty(&help)?
        }
    };
    println!("{json}");

    beamsense::perf::log_summary();
    Ok(())
}

/// Introspection settings from a JSON file; defaults when the file has no
/// `introspection` section.
fn load_settings(path: &Path) -> anyhow::Result<IntrospectionConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Settings file {} is not valid JSON", path.display()))?;
    Ok(parse_config(&value).unwrap_or_default())
}

fn expect_value(argv: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<String> {
    argv.next()
        .ok_or_else(|| anyhow!("Missing value for '{flag}'"))
}
