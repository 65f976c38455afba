// Copyright 2020 by Michael Thies <mail@mhthies.de>
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except in compliance with
// the License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

use examtt::{
    CellularEa, CellularEaConfig, CoolingSchedule, GridShape,
};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() {
    // Setup logging & parse command line arguments
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!(
        "This is the ITC-2007 Examination Timetabling solver (examtt), version {}",
        option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")
    );
    let args = parse_cli_args();

    info!(
        "Detected {} CPU core(s). The cellular EA runs single-threaded per the current design; \
         cells could be evaluated in parallel across a generation's double buffer if needed.",
        num_cpus::get()
    );

    let dataset_index: u32 = args.get_one::<String>("DATASET_INDEX").unwrap()
        .parse()
        .unwrap_or_else(|e| {
            error!("Could not parse dataset index: {}", e);
            std::process::exit(exitcode::DATAERR)
        });
    if dataset_index == 0 {
        error!("Dataset index is 1-based and must be >= 1.");
        std::process::exit(exitcode::DATAERR);
    }

    let benchmarks_dir: &String = args.get_one("BENCHMARKS_DIR").unwrap();
    let output_dir: &String = args.get_one("OUTPUT_DIR").unwrap();
    let input_path = format!("{}/exam_comp_set{}.exam", benchmarks_dir, dataset_index);
    let output_path = format!("{}/exam_comp_set{}.sol", output_dir, dataset_index);

    debug!("Opening input file {} ...", input_path);
    let file = File::open(&input_path).unwrap_or_else(|e| {
        error!("Could not open input file {}: {}", input_path, e);
        std::process::exit(exitcode::NOINPUT)
    });

    let data = examtt::io::exam_format::read(file).unwrap_or_else(|e| {
        error!("Could not read input file: {}", e);
        std::process::exit(exitcode::DATAERR)
    });

    if cfg!(debug_assertions) {
        examtt::io::assert_data_consistency(&data);
    }

    info!(
        "Found {} exams, {} periods and {} rooms for examination timetabling.",
        data.num_exams(),
        data.num_periods(),
        data.num_rooms()
    );
    debug!("Exams:\n{}", examtt::io::debug_list_of_exams(&data));

    if data.num_exams() == 0 {
        error!("Solving an examination timetable requires 1 or more exams.");
        std::process::exit(exitcode::DATAERR);
    }

    let seed: u64 = *args.get_one("seed").unwrap_or(&42);
    let mut rng = StdRng::seed_from_u64(seed);

    let rows: usize = *args.get_one("rows").unwrap_or(&4);
    let cols: usize = *args.get_one("cols").unwrap_or(&4);
    let generations: u64 = *args.get_one("generations").unwrap_or(&1000);

    let cancel: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        if let Err(e) = unsafe {
            signal_hook::low_level::register(signal_hook::consts::SIGINT, move || {
                cancel.store(true, Ordering::SeqCst);
            })
        } {
            warn!("Could not install SIGINT handler: {}", e);
        }
    }

    let config = CellularEaConfig {
        grid: GridShape { rows, cols },
        schedule: CoolingSchedule {
            t_max: 1.6,
            alpha: 0.995,
            span: 50,
            t_min: 0.001,
        },
        p_mutation: 0.8,
        p_improvement: 0.2,
        generations,
    };
    info!(
        "Starting cellular EA: {}x{} population, {} generations.",
        rows, cols, generations
    );

    let data = Arc::new(data);
    let ea = CellularEa::new(config);
    let best = ea.run(data, &mut rng, &cancel).unwrap_or_else(|e| {
        error!("Could not construct a feasible timetable: {}", e);
        std::process::exit(exitcode::DATAERR)
    });

    info!(
        "Finished solving. Best solution found has soft cost {} ({}).",
        best.cost(),
        if best.is_feasible() {
            "feasible"
        } else {
            "INFEASIBLE -- this indicates an internal bug"
        }
    );

    debug!("Opening output file {} ...", output_path);
    match File::create(&output_path) {
        Err(e) => {
            error!("Could not open output file {}: {}.", output_path, e);
            std::process::exit(exitcode::CANTCREAT);
        }
        Ok(file) => match examtt::io::solution_format::write(file, &best) {
            Ok(_) => debug!("Solution written to {}.", output_path),
            Err(e) => {
                error!("Could not write solution to {}: {}.", output_path, e);
                std::process::exit(exitcode::IOERR);
            }
        },
    }

    if args.get_flag("print") {
        println!("Best soft cost: {}", best.cost());
    }
}

/// Helper function to construct and execute parser for command line options
fn parse_cli_args() -> clap::ArgMatches {
    clap::command!()
        .arg(
            clap::Arg::new("seed")
                .short('s')
                .long("seed")
                .help("Seed for the pseudo-random number generator driving construction, Kempe moves and the cellular EA.")
                .value_name("SEED")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            clap::Arg::new("rows")
                .long("rows")
                .help("Number of rows of the cellular EA's toroidal population grid.")
                .value_name("ROWS")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            clap::Arg::new("cols")
                .long("cols")
                .help("Number of columns of the cellular EA's toroidal population grid.")
                .value_name("COLS")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            clap::Arg::new("generations")
                .short('g')
                .long("generations")
                .help("Number of cellular EA generations to run.")
                .value_name("GENERATIONS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            clap::Arg::new("print")
                .short('p')
                .long("print")
                .help("Print a short summary of the best solution to stdout.")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("DATASET_INDEX")
                .help("1-based index of the dataset to solve, i.e. exam_comp_set<INDEX>.exam")
                .required(true)
                .index(1),
        )
        .arg(
            clap::Arg::new("BENCHMARKS_DIR")
                .help("Directory containing the exam_comp_set<INDEX>.exam benchmark files")
                .required(true)
                .index(2),
        )
        .arg(
            clap::Arg::new("OUTPUT_DIR")
                .help("Directory the exam_comp_set<INDEX>.sol solution file is written to")
                .required(true)
                .index(3),
        )
        .get_matches()
}
