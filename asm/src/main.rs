//! The `xasm` CLI: reads one `.asm` file, assembles it, and writes the resulting object file
//! plus an optional source map, grounded on the teacher's `vasm/src/main.rs` binary shape.

#[macro_use]
extern crate clap;

use asm::warn::{self, WarnAction};
use byteorder::WriteBytesExt;
use clap::Arg;
use std::fs::File;
use std::io::prelude::*;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use util::Endian;

#[derive(Debug)]
enum IoContext {
    ReadInput,
    WriteOutput,
}

#[derive(Debug)]
enum Error {
    Io(std::io::Error, IoContext, PathBuf),
    Config(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err, context, path) => write!(
                f,
                "{} file \"{}\" failed: {}",
                match context {
                    IoContext::ReadInput => "Reading input",
                    IoContext::WriteOutput => "Writing output",
                },
                path.display(),
                err
            ),
            Error::Config(msg) => write!(f, "{}", msg),
        }
    }
}

fn main() {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("INPUT")
                .help("Sets the input file to use")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("OUTPUT")
                .help("Sets the output file to write to"),
        )
        .arg(
            Arg::with_name("source_map")
                .short("m")
                .long("source_map")
                .takes_value(true)
                .value_name("SOURCE_MAP")
                .help("Sets the file to write the source map to"),
        )
        .arg(
            Arg::with_name("bits")
                .long("bits")
                .takes_value(true)
                .possible_values(&["16", "32", "64"])
                .default_value("32")
                .help("Sets the assembly mode"),
        )
        .arg(
            Arg::with_name("warning")
                .short("w")
                .multiple(true)
                .number_of_values(1)
                .takes_value(true)
                .value_name("[+-*]WARNING")
                .help("Enables, disables, or resets a warning class before assembly starts"),
        )
        .arg(
            Arg::with_name("warning_error")
                .long("Werror")
                .takes_value(true)
                .value_name("WARNING")
                .multiple(true)
                .number_of_values(1)
                .help("Promotes a warning class to an error before assembly starts"),
        )
        .get_matches();

    let input = matches.value_of("INPUT").unwrap();
    let output = matches.value_of("output");
    let map = matches.value_of("source_map");
    let bits: u8 = value_t!(matches, "bits", u8).unwrap_or(32);

    let initial_warnings = match collect_warnings(&matches) {
        Ok(w) => w,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = run(input, output, map, bits, &initial_warnings) {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn collect_warnings(matches: &clap::ArgMatches) -> Result<Vec<WarnAction>, Error> {
    let mut actions = Vec::new();
    if let Some(values) = matches.values_of("warning") {
        for v in values {
            actions.push(warn::parse_directive_arg(v).map_err(|e| Error::Config(format!("-w{}: {}", v, e)))?);
        }
    }
    if let Some(values) = matches.values_of("warning_error") {
        for v in values {
            actions.push(
                warn::parse_directive_arg(&format!("error={}", v))
                    .map_err(|e| Error::Config(format!("-Werror={}: {}", v, e)))?,
            );
        }
    }
    Ok(actions)
}

fn run(
    input: &str,
    output: Option<&str>,
    map: Option<&str>,
    bits: u8,
    initial_warnings: &[WarnAction],
) -> Result<(), Error> {
    let input_path = Path::new(input);
    let base_dir = input_path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

    let input_file = File::open(input_path).map_err(|err| Error::Io(err, IoContext::ReadInput, input_path.to_owned()))?;
    let mut buf_reader = BufReader::new(input_file);
    let mut source = String::new();
    buf_reader
        .read_to_string(&mut source)
        .map_err(|err| Error::Io(err, IoContext::ReadInput, input_path.to_owned()))?;

    let out = asm::assemble(&source, bits, &base_dir, initial_warnings);

    for diag in &out.diagnostics {
        eprintln!("{}", diag);
    }

    let output_path: PathBuf = output.map(PathBuf::from).unwrap_or_else(|| input_path.with_extension("bin"));
    let object = objfmt::ObjectFile::from(out.bytes);
    objfmt::write_file(&output_path, &object).map_err(|err| Error::Io(err, IoContext::WriteOutput, output_path))?;

    if let Some(map_path_str) = map {
        let map_path = PathBuf::from(map_path_str);
        write_source_map(&out.source_map, &map_path).map_err(|err| Error::Io(err, IoContext::WriteOutput, map_path))?;
    }

    Ok(())
}

fn write_source_map(source_map: &[asm::sourcemap::SourceMapItem], path: &Path) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for item in source_map {
        writer.write_u32::<Endian>(item.start_line)?;
        writer.write_u32::<Endian>(item.line_count)?;
    }
    Ok(())
}
