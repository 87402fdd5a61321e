//! CLI entry point for the `rv32-asm` binary.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use assembler::assemble_source;

const USAGE_TEXT: &str = "\
Usage: rv32-asm <input> [options]

Assembles source to a little-endian binary image.

Options:
  -o, --output <file>  Output file path (default: input stem + .bin)
  -h, --help           Show this help message

Examples:
  rv32-asm program.s
  rv32-asm program.s -o program.bin
";

#[derive(Debug, PartialEq, Eq)]
struct BuildArgs {
    input: PathBuf,
    output: Option<PathBuf>,
}

#[derive(Debug)]
enum ParseResult {
    Build(BuildArgs),
    Help,
}

#[allow(clippy::while_let_on_iterator)]
fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let mut input: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            return Ok(ParseResult::Help);
        }

        if arg == "-o" || arg == "--output" {
            let value = args
                .next()
                .ok_or_else(|| "missing value for -o".to_string())?;
            output = Some(PathBuf::from(value));
            continue;
        }

        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }

        if input.is_some() {
            return Err("multiple input paths provided".to_string());
        }
        input = Some(PathBuf::from(arg));
    }

    let input = input.ok_or_else(|| "missing input path".to_string())?;
    Ok(ParseResult::Build(BuildArgs { input, output }))
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("out");
    let parent = input.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{stem}.bin"))
}

fn run_build(args: BuildArgs) -> Result<(), i32> {
    let source = match fs::read_to_string(&args.input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error: failed to read {}: {e}", args.input.display());
            return Err(1);
        }
    };

    let binary = match assemble_source(&source) {
        Ok(binary) => binary,
        Err(e) => {
            eprintln!("error: {e}");
            return Err(1);
        }
    };

    let output_path = args
        .output
        .unwrap_or_else(|| default_output_path(&args.input));

    if let Err(e) = fs::write(&output_path, &binary) {
        eprintln!("error: failed to write output: {e}");
        return Err(1);
    }

    println!(
        "Assembled {} ({} bytes) -> {}",
        args.input.display(),
        binary.len(),
        output_path.display()
    );

    Ok(())
}

fn main() {
    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Build(args)) => match run_build(args) {
            Ok(()) => 0,
            Err(code) => code,
        },
        Err(error) => {
            eprintln!("error: {error}");
            eprintln!("{USAGE_TEXT}");
            1
        }
    };

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::path::PathBuf;

    #[test]
    fn parses_input_and_output() {
        let result = parse_args(
            [
                OsString::from("program.s"),
                OsString::from("-o"),
                OsString::from("out.bin"),
            ]
            .into_iter(),
        )
        .expect("valid args should parse");

        match result {
            ParseResult::Build(args) => assert_eq!(
                args,
                BuildArgs {
                    input: PathBuf::from("program.s"),
                    output: Some(PathBuf::from("out.bin")),
                }
            ),
            ParseResult::Help => panic!("expected build args"),
        }
    }

    #[test]
    fn parses_help_flag() {
        let result = parse_args([OsString::from("--help")].into_iter())
            .expect("help should parse without error");
        assert!(matches!(result, ParseResult::Help));
    }

    #[test]
    fn rejects_unknown_option() {
        let error = parse_args([OsString::from("--fast")].into_iter())
            .expect_err("unknown option should fail parse");
        assert!(error.contains("unknown option"));
    }

    #[test]
    fn rejects_missing_input() {
        let error =
            parse_args(std::iter::empty()).expect_err("missing input should fail parse");
        assert!(error.contains("missing input"));
    }

    #[test]
    fn rejects_multiple_inputs() {
        let error = parse_args([OsString::from("a.s"), OsString::from("b.s")].into_iter())
            .expect_err("two inputs should fail parse");
        assert!(error.contains("multiple input"));
    }

    #[test]
    fn default_output_path_swaps_the_extension() {
        assert_eq!(
            default_output_path(&PathBuf::from("src/program.s")),
            PathBuf::from("src/program.bin")
        );
        assert_eq!(
            default_output_path(&PathBuf::from("program")),
            PathBuf::from("program.bin")
        );
    }
}
