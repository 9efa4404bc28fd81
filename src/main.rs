use std::io;
use std::path::Path;
use std::process;

use clap::{crate_version, value_t, App, Arg, ArgMatches};
use log::LevelFilter;

use pummel::config::{parse_method, positive_seconds, seconds};
use pummel::{parse_headers, setup_logger, Config, ConfigBuilder, Coordinator, Result};

fn main() {
    let matches = cli().get_matches();

    if let Err(e) = run(&matches) {
        eprintln!("{}", e);
        process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> Result<()> {
    let log_level = match matches.occurrences_of("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    setup_logger(log_level, matches.value_of("log-file").map(Path::new))?;

    let config = config_from_argmatches(matches)?;
    let coordinator = Coordinator::new(config);

    // catch interrupt and let the workers wind down
    pummel::install_interrupt_handler(coordinator.stop_signal())?;

    let result = coordinator.run(&mut io::stdout())?;
    print!("{}", result);

    Ok(())
}

fn cli() -> App<'static, 'static> {
    App::new("pummel")
        .version(crate_version!())
        .author("ryan ragona <ryan@ragona.com>")
        .about("Send multiple HTTP requests concurrently using threads.")
        .arg(
            Arg::with_name("url")
                .help("Target URL")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("threads")
                .short("t")
                .long("threads")
                .help("Number of worker threads; 0 uses every CPU")
                .takes_value(true)
                .default_value("4"),
        )
        .arg(
            Arg::with_name("requests")
                .short("n")
                .long("requests")
                .help("Total number of requests to send")
                .takes_value(true)
                .default_value("20"),
        )
        .arg(
            Arg::with_name("delay")
                .short("d")
                .long("delay")
                .help("Delay (sec) between requests per thread")
                .takes_value(true)
                .default_value("0"),
        )
        .arg(
            Arg::with_name("timeout")
                .long("timeout")
                .help("Request timeout in seconds")
                .takes_value(true)
                .default_value("10"),
        )
        .arg(
            Arg::with_name("method")
                .short("m")
                .long("method")
                .help("HTTP method (GET, POST, etc.)")
                .takes_value(true)
                .default_value("GET"),
        )
        .arg(
            Arg::with_name("header")
                .short("H")
                .long("header")
                .help("Custom header, can be repeated. Format: 'Name: Value'")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1),
        )
        .arg(
            Arg::with_name("data")
                .long("data")
                .help("Request body for POST/PUT requests")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("join-timeout")
                .long("join-timeout")
                .help("Seconds to wait for in-flight requests after a stop")
                .takes_value(true)
                .default_value("1"),
        )
        .arg(
            Arg::with_name("log-file")
                .long("log-file")
                .help("Also write logs to this file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
}

fn config_from_argmatches(matches: &ArgMatches) -> Result<Config> {
    // url is required, clap has already bailed if it's missing
    let url = matches.value_of("url").unwrap_or_default();

    let threads = value_t!(matches, "threads", usize).unwrap_or_else(|e| e.exit());
    let requests = value_t!(matches, "requests", usize).unwrap_or_else(|e| e.exit());
    let delay = value_t!(matches, "delay", f64).unwrap_or_else(|e| e.exit());
    let timeout = value_t!(matches, "timeout", f64).unwrap_or_else(|e| e.exit());
    let join_timeout = value_t!(matches, "join-timeout", f64).unwrap_or_else(|e| e.exit());

    let headers = parse_headers(matches.values_of("header").into_iter().flatten());
    let method = parse_method(matches.value_of("method").unwrap_or("GET"))?;

    Ok(ConfigBuilder::parse(url)?
        .threads(threads)
        .requests(requests)
        .delay(seconds("delay", delay)?)
        .timeout(positive_seconds("timeout", timeout)?)
        .join_timeout(positive_seconds("join-timeout", join_timeout)?)
        .method(method)
        .headers(headers)
        .body(matches.value_of("data").map(String::from))
        .build())
}
