use clap::{Parser, Subcommand};
use cwlharness::loader::{self, Selection};
use cwlharness::report::{self, Outcome};
use cwlharness::schema::{self, RunnerConfig, TestArg, DEFAULT_TIMEOUT};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "cwlharness")]
#[command(about = "A conformance test harness for CWL runners")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a conformance test suite against a runner
    Run {
        /// Path to the test suite document (YAML or JSON)
        suite: PathBuf,
        /// Runner executable under test
        #[arg(long, default_value = "cwl-runner")]
        tool: String,
        /// Extra arguments passed to the runner before per-test flags
        #[arg(last = true)]
        args: Vec<String>,
        /// Map a test-case field to a runner flag, as name==flag
        #[arg(long = "test-arg", value_name = "NAME==FLAG")]
        testargs: Vec<String>,
        /// Number of tests to run in parallel
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,
        /// Per-test timeout in seconds
        #[arg(long, default_value_t = DEFAULT_TIMEOUT)]
        timeout: u64,
        /// Only run tests carrying any of these tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        /// Skip tests carrying any of these tags
        #[arg(long = "exclude-tags", value_delimiter = ',')]
        exclude_tags: Vec<String>,
        /// Only run these test numbers, e.g. 1,3-6,9
        #[arg(short = 'n', long)]
        numbers: Option<String>,
        /// Skip these test numbers
        #[arg(short = 'N', long = "exclude-numbers")]
        exclude_numbers: Option<String>,
        /// Only run tests with these short names
        #[arg(short = 's', long = "short-names", value_delimiter = ',')]
        short_names: Vec<String>,
        /// Skip tests with these short names
        #[arg(short = 'S', long = "exclude-short-names", value_delimiter = ',')]
        exclude_short_names: Vec<String>,
        /// Write a JUnit XML report to this path
        #[arg(long = "junit-xml")]
        junit_xml: Option<PathBuf>,
        /// Do not pass --quiet to the runner, keeping captured output rich
        #[arg(long = "junit-verbose")]
        junit_verbose: bool,
        /// Write per-tag badge artifacts into this directory
        #[arg(long)]
        badgedir: Option<PathBuf>,
        /// Show runner stderr live instead of capturing it
        #[arg(short, long)]
        verbose: bool,
        /// Class name recorded on report entries
        #[arg(long, default_value = "")]
        classname: String,
        /// Base directory output file locations are resolved against
        #[arg(long)]
        basedir: Option<PathBuf>,
        /// Parent directory for per-test output directories
        #[arg(long)]
        outdir: Option<PathBuf>,
    },
    /// List the tests of a suite
    List {
        /// Path to the test suite document
        suite: PathBuf,
    },
    /// List all distinct tags of a suite
    Tags {
        /// Path to the test suite document
        suite: PathBuf,
    },
    /// Validate a suite document without running anything
    Validate {
        /// Path to the test suite document
        suite: PathBuf,
    },
    /// Output the JSON Schema of the suite format
    Schema,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            suite,
            tool,
            args,
            testargs,
            jobs,
            timeout,
            tags,
            exclude_tags,
            numbers,
            exclude_numbers,
            short_names,
            exclude_short_names,
            junit_xml,
            junit_verbose,
            badgedir,
            verbose,
            classname,
            basedir,
            outdir,
        } => {
            let tests = load_or_exit(&suite);

            let testargs: Vec<TestArg> = testargs
                .iter()
                .map(|s| match TestArg::parse(s) {
                    Some(arg) => arg,
                    None => {
                        eprintln!("Error: --test-arg must be name==flag, got {s:?}");
                        std::process::exit(2);
                    }
                })
                .collect();

            let selection = Selection {
                tags,
                exclude_tags,
                include_numbers: numbers.as_deref().map(parse_numbers_or_exit),
                exclude_numbers: exclude_numbers
                    .as_deref()
                    .map(parse_numbers_or_exit)
                    .unwrap_or_default(),
                include_names: short_names,
                exclude_names: exclude_short_names,
            };
            let selected = loader::select_tests(tests, &selection);
            if selected.is_empty() {
                eprintln!("No tests selected");
                return;
            }

            let config = RunnerConfig {
                tool,
                args,
                testargs,
                basedir: basedir.unwrap_or_else(|| PathBuf::from(".")),
                outdir_base: outdir,
                timeout,
                verbose,
                junit_verbose,
                classname,
            };

            let cancel = Arc::new(AtomicBool::new(false));
            #[cfg(unix)]
            for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
                if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&cancel)) {
                    eprintln!("Error: cannot install signal handler: {e}");
                    std::process::exit(1);
                }
            }

            let suite_name = suite
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| suite.display().to_string());
            let outcome = cwlharness::run_suite(&config, &suite_name, selected, jobs, &cancel);

            if let Some(fatal) = &outcome.fatal {
                eprintln!("Error: {fatal}");
                std::process::exit(1);
            }

            for (index, test, result) in &outcome.results {
                if report::classify_outcome(result.return_code, test.is_required())
                    == Outcome::Failed
                {
                    eprintln!(
                        "Test [{}] {} failed: {}",
                        index + 1,
                        test.display_name(),
                        result.message
                    );
                }
            }

            let triples: Vec<_> = outcome
                .results
                .iter()
                .map(|(i, t, r)| (*i, t, r))
                .collect();
            if let Some(path) = &junit_xml {
                let xml = report::format_junit_xml(&suite_name, &triples);
                if let Err(e) = std::fs::write(path, xml) {
                    eprintln!("Error: cannot write {}: {e}", path.display());
                    std::process::exit(1);
                }
            }
            if let Some(dir) = &badgedir {
                if let Err(e) = report::write_badges(dir, &outcome.stats) {
                    eprintln!("Error: cannot write badges to {}: {e}", dir.display());
                    std::process::exit(1);
                }
            }

            eprintln!("{}", outcome.stats.summary());
            if outcome.interrupted || cancel.load(Ordering::SeqCst) {
                eprintln!("Interrupted, partial results reported");
                std::process::exit(1);
            }
            std::process::exit(outcome.stats.exit_code());
        }
        Command::List { suite } => {
            let tests = load_or_exit(&suite);
            for (i, test) in tests.iter().enumerate() {
                let doc = test.doc_line();
                if doc.is_empty() {
                    println!("[{}] {}", i + 1, test.display_name());
                } else {
                    println!("[{}] {}: {doc}", i + 1, test.display_name());
                }
            }
        }
        Command::Tags { suite } => {
            let tests = load_or_exit(&suite);
            for tag in loader::all_tags(&tests) {
                println!("{tag}");
            }
        }
        Command::Validate { suite } => {
            let tests = load_or_exit(&suite);
            println!("{} is valid ({} tests)", suite.display(), tests.len());
        }
        Command::Schema => {
            let schema = schema::generate_schema();
            match serde_json::to_string_pretty(&schema) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error: cannot serialize schema: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}

fn load_or_exit(suite: &std::path::Path) -> Vec<schema::TestCase> {
    match loader::load_suite(suite) {
        Ok(tests) => tests,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn parse_numbers_or_exit(expr: &str) -> Vec<usize> {
    match loader::expand_number_range(expr) {
        Ok(numbers) => numbers,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    }
}
