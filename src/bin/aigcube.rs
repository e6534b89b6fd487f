//! Command line frontend for cube-and-conquer solving on AIG circuits

use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
    process::ExitCode,
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;

use aigcube::{
    circuit::Circuit,
    conquer::{self, RunConfig},
    cube::{CubeBuilder, CubeSet, ScorePolicy},
    encodings::Encoding,
    fio,
    report::{self, FinalAnswer, RunReport},
    solvers::BackendSpec,
};

/// Cube-and-conquer SAT solving on and-inverter graphs
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split the circuit into cubes and solve them
    Solve {
        /// Path to the AIGER circuit (`.aag` or `.aig`)
        circuit: PathBuf,

        #[command(flatten)]
        cube_opts: CubeOpts,

        /// Per-cube wall-clock timeout in seconds
        #[arg(short, long)]
        timeout: Option<f64>,

        /// Number of parallel conquer workers
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,

        /// External SAT solver executable (default: in-process BatSat)
        #[arg(short, long)]
        solver: Option<PathBuf>,

        /// Keep the per-cube CNF files in this directory
        #[arg(long, value_name = "DIR")]
        keep_cnfs: Option<PathBuf>,
    },

    /// Generate cubes and write each sub-problem as DIMACS CNF
    Cube {
        /// Path to the AIGER circuit (`.aag` or `.aig`)
        circuit: PathBuf,

        /// Directory for the cube CNF files
        #[arg(short, long, value_name = "DIR")]
        out_dir: PathBuf,

        #[command(flatten)]
        cube_opts: CubeOpts,
    },
}

#[derive(Args)]
struct CubeOpts {
    /// Cube-stage split depth
    #[arg(short, long, default_value_t = CubeBuilder::DEFAULT_DEPTH)]
    depth: u32,

    /// Lookahead candidate set size
    #[arg(short = 'k', long, default_value_t = CubeBuilder::DEFAULT_CANDIDATE_LIMIT)]
    candidates: usize,

    /// Lookahead scoring policy
    #[arg(long, value_enum, default_value_t = ScoreArg::Propagation)]
    score: ScoreArg,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScoreArg {
    /// Product of the two branch propagation counts
    Propagation,
    /// Total propagation weighted by branch balance
    Balance,
}

impl From<ScoreArg> for ScorePolicy {
    fn from(arg: ScoreArg) -> Self {
        match arg {
            ScoreArg::Propagation => ScorePolicy::PropagationProduct,
            ScoreArg::Balance => ScorePolicy::BranchBalance,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match execute(Cli::parse()) {
        // SAT-competition exit codes, so external tooling can consume the
        // answer; an inconclusive run is a completed run, not an error
        Ok(FinalAnswer::Sat) => ExitCode::from(10),
        Ok(FinalAnswer::Unsat) => ExitCode::from(20),
        Ok(FinalAnswer::Unknown) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> anyhow::Result<FinalAnswer> {
    match cli.command {
        Commands::Solve {
            circuit,
            cube_opts,
            timeout,
            jobs,
            solver,
            keep_cnfs,
        } => {
            let (encoding, circuit) = load(&circuit)?;
            let (set, cube_time) = generate(&circuit, &encoding, &cube_opts)?;
            let report = match set {
                CubeSet::Trivial(answer) => RunReport::trivial(answer, cube_time),
                CubeSet::Split(cubes) => {
                    let backend = solver.map_or(BackendSpec::InProcess, |solver| {
                        BackendSpec::External { solver }
                    });
                    let config = RunConfig {
                        timeout: timeout.map(Duration::from_secs_f64),
                        jobs,
                        artifact_dir: keep_cnfs,
                    };
                    let verdicts = conquer::run(&cubes, &encoding, &backend, &config)?;
                    for v in &verdicts {
                        println!(
                            "  cube {:4}: {}  ({:.2}s)",
                            v.index,
                            v.verdict,
                            v.elapsed.as_secs_f64()
                        );
                    }
                    report::aggregate(cube_time, verdicts)
                }
            };
            println!("{report}");
            if let Some(witness) = &report.witness {
                println!("Witness (inputs): {witness}");
            }
            Ok(report.answer)
        }
        Commands::Cube {
            circuit,
            out_dir,
            cube_opts,
        } => {
            let (encoding, circuit) = load(&circuit)?;
            let (set, cube_time) = generate(&circuit, &encoding, &cube_opts)?;
            match set {
                CubeSet::Trivial(answer) => {
                    println!(
                        "Trivially {} (no cubes to write)",
                        if answer { "SAT" } else { "UNSAT" }
                    );
                    Ok(if answer {
                        FinalAnswer::Sat
                    } else {
                        FinalAnswer::Unsat
                    })
                }
                CubeSet::Split(cubes) => {
                    fs::create_dir_all(&out_dir).with_context(|| {
                        format!("creating output directory {}", out_dir.display())
                    })?;
                    for cube in &cubes {
                        let path = out_dir.join(format!("cube_{:04}.cnf", cube.index()));
                        let mut writer = BufWriter::new(
                            File::create(&path)
                                .with_context(|| format!("creating {}", path.display()))?,
                        );
                        fio::write_dimacs(&mut writer, &encoding.assume(cube.lits()))
                            .with_context(|| format!("writing {}", path.display()))?;
                    }
                    println!(
                        "Saved {} cubes to {} ({:.2}s cube time)",
                        cubes.len(),
                        out_dir.display(),
                        cube_time.as_secs_f64()
                    );
                    Ok(FinalAnswer::Unknown)
                }
            }
        }
    }
}

fn load(path: &Path) -> anyhow::Result<(Encoding, Circuit)> {
    let circuit = Circuit::from_aiger_path(path)
        .with_context(|| format!("loading circuit {}", path.display()))?;
    info!(
        "loaded circuit: {} inputs, {} and gates",
        circuit.n_inputs(),
        circuit.n_ands()
    );
    let encoding = Encoding::new(&circuit).context("encoding circuit")?;
    info!(
        "encoded {} clauses over {} variables",
        encoding.n_clauses(),
        encoding.max_var().map_or(0, |v| v.idx() + 1)
    );
    Ok((encoding, circuit))
}

fn generate(
    circuit: &Circuit,
    encoding: &Encoding,
    opts: &CubeOpts,
) -> anyhow::Result<(CubeSet, Duration)> {
    let start = Instant::now();
    let set = CubeBuilder::new(circuit, encoding)
        .depth(opts.depth)
        .candidate_limit(opts.candidates)
        .policy(opts.score.into())
        .build()
        .context("generating cubes")?;
    Ok((set, start.elapsed()))
}
