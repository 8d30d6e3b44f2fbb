use encore::app::AppStartupOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let options = parse_args(std::env::args().skip(1).collect())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("encore=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    encore::app::run(options)
}

fn parse_args(args: Vec<String>) -> anyhow::Result<AppStartupOptions> {
    let mut out = AppStartupOptions::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--user" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--user requires a name");
                };
                if value.trim().is_empty() {
                    anyhow::bail!("--user cannot be empty");
                }
                out.user = Some(value.trim().to_string());
            }
            "--folder" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--folder requires a path");
                };
                out.folders.push(PathBuf::from(value));
            }
            "--shuffle" => out.shuffle = true,
            "--null-audio" => out.null_audio = true,
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument {other}"),
        }
        index += 1;
    }
    Ok(out)
}

fn print_help() {
    println!("encore");
    println!("  --user NAME       Restore and save state for this user");
    println!("  --folder PATH     Queue every audio file under PATH (repeatable)");
    println!("  --shuffle         Start the loaded queue shuffled");
    println!("  --null-audio      Run without an audio output device");
}

#[cfg(test)]
mod tests {
    use super::parse_args;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn parses_repeatable_folders() {
        let options = parse_args(args(&["--folder", "a", "--folder", "b", "--shuffle"]))
            .expect("parse");
        assert_eq!(options.folders.len(), 2);
        assert!(options.shuffle);
        assert!(!options.null_audio);
    }

    #[test]
    fn rejects_missing_values_and_unknown_flags() {
        assert!(parse_args(args(&["--user"])).is_err());
        assert!(parse_args(args(&["--user", " "])).is_err());
        assert!(parse_args(args(&["--loud"])).is_err());
    }
}
