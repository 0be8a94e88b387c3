#[macro_use]
extern crate log;

use std::io::{self, BufRead, Write};

use clap::{Arg, ArgMatches, SubCommand};

use addon_index::uninstall::Confirm;
use addon_index::{logger, Category, Config, Result, Session, StoredAddon};

struct StdinConfirm {
    assume_yes: bool,
}

impl Confirm for StdinConfirm {
    fn confirm(&mut self, summary: &str, detail: &str) -> bool {
        println!("{}", summary);
        if !detail.is_empty() {
            println!("{}", detail);
        }

        if self.assume_yes {
            return true;
        }

        print!("[y/N] ");
        if io::stdout().flush().is_err() {
            return false;
        }

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => matches!(answer.trim(), "y" | "Y" | "yes"),
            Err(_) => false,
        }
    }
}

fn print_addons(addons: &[StoredAddon], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(addons)?);
        return Ok(());
    }

    for addon in addons {
        let r = &addon.record;
        println!(
            "{}\t{}\t{}\t{}\t{}",
            addon.row_id, r.name, r.category, r.version, r.author
        );
    }

    Ok(())
}

fn category(matches: &ArgMatches) -> Result<Category> {
    matches
        .value_of("category")
        .unwrap_or("plugins-installed")
        .parse()
}

fn dispatch(session: &mut Session, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        ("search", Some(m)) => {
            let query = m
                .values_of("query")
                .map(|v| v.collect::<Vec<_>>().join(" "))
                .unwrap_or_default();

            let addons = session.search(category(m)?, &query)?;
            print_addons(&addons, m.is_present("json"))
        }
        ("dependents", Some(m)) => {
            let id = m.value_of("interface-id").unwrap_or_default();

            for name in session.dependents(category(m)?, id)? {
                println!("{}", name);
            }

            Ok(())
        }
        ("uninstall", Some(m)) => {
            let row_ids: Vec<i64> = m
                .values_of("row-id")
                .map(|v| v.filter_map(|id| id.parse().ok()).collect())
                .unwrap_or_default();

            let mut confirm = StdinConfirm {
                assume_yes: m.is_present("yes"),
            };

            if let Some(report) = session.uninstall_plugins(&row_ids, &mut confirm)? {
                for path in &report.removed {
                    println!("removed {}", path.display());
                }
                for addon in &report.skipped {
                    println!("kept {}", addon.name);
                }
                for (path, reason) in &report.failed {
                    println!("failed {}: {}", path.display(), reason);
                }
                for warning in &report.warnings {
                    println!("warning: {}", warning);
                }
            }

            Ok(())
        }
        _ => {
            // Plain `scan`: the session already rescanned on open
            let addons = session.search(Category::PluginsInstalled, "")?;
            println!("{} plugins installed", addons.len());

            for warning in session.warnings() {
                println!("warning: {}", warning);
            }

            Ok(())
        }
    }
}

fn run(config: &Config, matches: &ArgMatches) -> Result<()> {
    let mut session = Session::open(config)?;

    let result = dispatch(&mut session, matches);
    let closed = session.close();

    result.and(closed)
}

fn main() {
    let category_arg = || {
        Arg::with_name("category")
            .long("category")
            .value_name("CATEGORY")
            .default_value("plugins-installed")
    };

    let matches = Config::app()
        .subcommand(SubCommand::with_name("scan").about("Rescan installed plugins"))
        .subcommand(
            SubCommand::with_name("search")
                .about("Search an addon table")
                .arg(category_arg())
                .arg(Arg::with_name("json").long("json").help("Print JSON"))
                .arg(Arg::with_name("query").multiple(true)),
        )
        .subcommand(
            SubCommand::with_name("dependents")
                .about("List addons depending on an interface id")
                .arg(category_arg())
                .arg(Arg::with_name("interface-id").required(true)),
        )
        .subcommand(
            SubCommand::with_name("uninstall")
                .about("Remove installed plugins by row id")
                .arg(
                    Arg::with_name("yes")
                        .short("y")
                        .long("yes")
                        .help("Answer yes to every confirmation"),
                )
                .arg(
                    Arg::with_name("row-id")
                        .required(true)
                        .multiple(true)
                        .validator(|v| v.parse::<i64>().map(|_| ()).map_err(|e| e.to_string())),
                ),
        )
        .get_matches();

    let config = Config::from_matches(matches.subcommand().1.unwrap_or(&matches));

    if let Err(e) = logger::init(config.log_level) {
        eprintln!("can't initialize logging: {}", e);
    }

    if let Err(e) = run(&config, &matches) {
        error!("{}", e);
        std::process::exit(1);
    }
}
