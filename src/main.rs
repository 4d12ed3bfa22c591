use admd_scrub::config::{Config, DEFAULT_SPAM_MARKER_PREFIX};
use admd_scrub::SmtpdFilter;
use clap::{Arg, ArgAction, Command};
use log::LevelFilter;
use std::io::Write;
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("filter-admdscrub")
        .version(env!("CARGO_PKG_VERSION"))
        .about("OpenSMTPD filter removing Authentication-Results headers that claim our authserv-id")
        .arg(
            Arg::new("authserv-id")
                .short('a')
                .long("authserv-id")
                .value_name("ID")
                .help("authserv-id to scrub (default: host name)"),
        )
        .arg(
            Arg::new("reject")
                .short('r')
                .long("reject")
                .help("Reject messages carrying a matching header instead of removing it")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("strip-spam")
                .short('s')
                .long("strip-spam")
                .help("Also remove spam marker headers")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("spam-marker")
                .long("spam-marker")
                .value_name("PREFIX")
                .help(format!(
                    "Field name prefix of spam marker headers (default: {DEFAULT_SPAM_MARKER_PREFIX})"
                )),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log messages without a matching header too; repeat for debug output")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("YAML configuration file; command line options take precedence"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Write a default configuration file and exit")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration, print the effective settings and exit")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    // smtpd forwards our stderr to its log; keep lines bare
    let log_level = if matches.get_count("verbose") > 1 {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading configuration: {e}");
                process::exit(1);
            }
        },
        None => Config::default(),
    };

    if let Some(id) = matches.get_one::<String>("authserv-id") {
        config.authserv_id = Some(id.clone());
    }
    if matches.get_flag("reject") {
        config.reject = true;
    }
    if let Some(prefix) = matches.get_one::<String>("spam-marker") {
        config.strip_spam_markers = true;
        config.spam_marker_prefix = prefix.clone();
    }
    if matches.get_flag("strip-spam") {
        config.strip_spam_markers = true;
    }
    config.verbose = config.verbose.saturating_add(matches.get_count("verbose"));

    let test_config = matches.get_flag("test-config");
    let policy = match config.into_policy() {
        Ok(policy) => policy,
        Err(e) => {
            eprintln!("filter-admdscrub: {e}");
            process::exit(1);
        }
    };

    if test_config {
        println!("authserv-id: {}", policy.authserv_id);
        println!("policy: {}", if policy.reject { "reject" } else { "filter" });
        match &policy.spam_marker {
            Some(re) => println!("spam markers: stripped ({})", re.as_str()),
            None => println!("spam markers: kept"),
        }
        println!("verbose: {}", policy.verbose);
        println!("Configuration OK");
        return;
    }

    let mut filter = SmtpdFilter::new(policy);
    if let Err(e) = filter.run_stdio().await {
        log::error!("filter-admdscrub: {e:#}");
        process::exit(1);
    }
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file(path)
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Set authserv_id to the identifier your own MTA stamps on its results.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}
