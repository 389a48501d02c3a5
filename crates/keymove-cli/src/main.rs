mod script;

use anyhow::Result;
use clap::Parser;
use keymove_mover::MoverSettings;
use script::Script;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Gesture script to replay (JSON)
    #[arg(short, long, conflicts_with = "demo")]
    script: Option<PathBuf>,

    /// Mover settings file (JSON); defaults apply when omitted
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Replay the built-in demo script
    #[arg(long)]
    demo: bool,

    /// Print the event log and fall-through shortcuts alongside the workspace
    #[arg(long)]
    events: bool,

    /// Log every replayed step
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let settings = match &args.settings {
        Some(path) => MoverSettings::load(path)?,
        None => MoverSettings::default(),
    };
    let script = match &args.script {
        Some(path) => Script::load(path)?,
        None if args.demo => script::demo(),
        None => anyhow::bail!("Nothing to replay: pass --script <path> or --demo"),
    };

    tracing::info!("Replaying {} steps", script.steps.len());
    let report = script::replay(&script, settings)?;
    tracing::info!(
        "Replay finished with {} events and {} host shortcuts",
        report.events.len(),
        report.host_shortcuts.len()
    );

    let output = if args.events {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string_pretty(&report.workspace)?
    };
    println!("{}", output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_accept_script_and_settings() {
        let args = Args::parse_from([
            "keymove",
            "--script",
            "moves.json",
            "--settings",
            "settings.json",
            "-v",
        ]);
        assert_eq!(args.script, Some(PathBuf::from("moves.json")));
        assert_eq!(args.settings, Some(PathBuf::from("settings.json")));
        assert!(args.verbose);
        assert!(!args.demo);
    }

    #[test]
    fn script_and_demo_conflict() {
        let result = Args::try_parse_from(["keymove", "--script", "a.json", "--demo"]);
        assert!(result.is_err());
    }
}
