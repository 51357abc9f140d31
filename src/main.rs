#[macro_use]
extern crate log;

use std::path::Path;
use std::process;

use clap::Arg;
use log::LevelFilter;

use tagindex::logger;
use tagindex::{BrowseFlag, Config, JsonDocumentSource, MediaIndex, TAGINDEX_VERSION};

fn main() {
    let matches = clap::App::new("tagindex")
        .version(TAGINDEX_VERSION)
        .arg(
            Arg::with_name("docs")
                .long("docs")
                .help("JSON array of documents to index")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("config")
                .long("config")
                .help("JSON configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("offset")
                .long("offset")
                .help("First entry of a sliced item list")
                .takes_value(true)
                .default_value("0"),
        )
        .arg(
            Arg::with_name("count")
                .long("count")
                .help("Maximum entries of a sliced item list, 0 for all")
                .takes_value(true)
                .default_value("0"),
        )
        .arg(
            Arg::with_name("meta")
                .long("meta")
                .help("Return item metadata instead of children"),
        )
        .arg(
            Arg::with_name("verbose")
                .long("verbose")
                .short("v")
                .multiple(true)
                .help("More logging, repeat for trace"),
        )
        .arg(
            Arg::with_name("objid")
                .help("Object ids to browse")
                .multiple(true)
                .default_value("0$uprcl"),
        )
        .get_matches();

    logger::init(match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    });

    info!("{}", TAGINDEX_VERSION);

    let config = match matches.value_of("config") {
        Some(path) => Config::load(Path::new(path)).unwrap_or_else(|e| {
            error!("{}", e);
            process::exit(1);
        }),
        None => Config::default(),
    };

    let offset: usize = matches
        .value_of("offset")
        .unwrap()
        .parse()
        .expect("invalid offset");
    let count: usize = matches
        .value_of("count")
        .unwrap()
        .parse()
        .expect("invalid count");
    let flag = if matches.is_present("meta") {
        BrowseFlag::Meta
    } else {
        BrowseFlag::Children
    };

    let index = MediaIndex::new(config);
    let source = JsonDocumentSource::new(Path::new(matches.value_of("docs").unwrap()));

    match index.rebuild(&source) {
        Ok(stat) => info!("{:?}", stat),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }

    let mut failed = false;

    for objid in matches.values_of("objid").unwrap() {
        match index.browse(objid, flag, offset, count) {
            Ok(listing) => println!(
                "{}",
                serde_json::to_string_pretty(&listing).expect("can't serialize listing")
            ),
            Err(e) => {
                error!("{}: {}", objid, e);
                failed = true;
            }
        }
    }

    if failed {
        process::exit(2);
    }
}
