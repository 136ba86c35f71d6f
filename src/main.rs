use clap::{Parser as ClapParser, Subcommand};
use quarry::cli::{self, CliError, PathOptions, SearchOptions, SearchResult, ValidateOptions};
use std::{
    fs,
    io::{self, Read},
    path::PathBuf,
};

#[derive(ClapParser)]
#[command(name = "quarry")]
#[command(about = "quarry - JMESPath, JSONPath and JSON Schema for JSON documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a JMESPath expression
    Search {
        /// The expression to evaluate
        expression: String,

        /// JSON input (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<String>,

        /// Pretty-print the output
        #[arg(short, long)]
        pretty: bool,

        /// Only validate syntax, don't execute
        #[arg(long)]
        syntax_only: bool,

        /// Abort after this many evaluation steps
        #[arg(long)]
        step_budget: Option<usize>,
    },

    /// Select nodes with a JSONPath query
    Path {
        /// The JSONPath query
        path: String,

        /// JSON input (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<String>,

        /// Pretty-print the output
        #[arg(short, long)]
        pretty: bool,

        /// Print normalized paths of the matches instead of their values
        #[arg(long)]
        locations: bool,
    },

    /// Validate JSON input against a JSON Schema file
    Validate {
        /// Path to the schema document
        schema: PathBuf,

        /// JSON input (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<String>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Search {
            expression,
            input,
            pretty,
            syntax_only,
            step_budget,
        } => run_search(expression, input, pretty, syntax_only, step_budget),
        Commands::Path {
            path,
            input,
            pretty,
            locations,
        } => run_path(path, input, pretty, locations),
        Commands::Validate { schema, input } => run_validate(schema, input),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

/// `--input` if given, else stdin when it is piped.
fn read_input(input: Option<String>) -> Result<Option<String>, CliError> {
    match input {
        Some(s) => Ok(Some(s)),
        None if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(Some(buffer))
        }
        None => Ok(None),
    }
}

fn run_search(
    expression: String,
    input: Option<String>,
    pretty: bool,
    syntax_only: bool,
    step_budget: Option<usize>,
) -> Result<(), CliError> {
    let input = if syntax_only { None } else { read_input(input)? };
    let options = SearchOptions {
        expression,
        input,
        syntax_only,
        step_budget,
    };

    match cli::execute_search(&options)? {
        SearchResult::SyntaxValid => println!("Syntax is valid"),
        SearchResult::Success(output) => println!("{}", cli::render(&output, pretty)?),
    }
    Ok(())
}

fn run_path(path: String, input: Option<String>, pretty: bool, locations: bool) -> Result<(), CliError> {
    let options = PathOptions {
        path,
        input: read_input(input)?,
        locations,
    };
    let output = cli::execute_path(&options)?;
    println!("{}", cli::render(&output, pretty)?);
    Ok(())
}

fn run_validate(schema: PathBuf, input: Option<String>) -> Result<(), CliError> {
    let options = ValidateOptions {
        schema: fs::read_to_string(schema)?,
        input: read_input(input)?,
    };
    cli::execute_validate(&options)?;
    println!("Document is valid");
    Ok(())
}
