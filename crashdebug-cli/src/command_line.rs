//! Command line handling.
//!
//! Options are gathered in a first pass, the image and dump are loaded,
//! and only then does a second pass apply `--alias` options: an alias
//! can redirect into a region that exists solely because the dump
//! created it.

use std::fs;

use crashdebug::{load_bin_image, load_dump, load_elf_image, MemorySim, RegisterContext};

#[derive(Debug, thiserror::Error)]
pub enum CommandLineError {
    #[error("unrecognized argument \"{0}\"")]
    UnrecognizedArgument(String),

    #[error("option {0} is missing required value(s)")]
    MissingValue(&'static str),

    #[error("\"{0}\" is not a valid number")]
    InvalidNumber(String),

    #[error("an image (--elf or --bin) and a dump (--dump) must both be supplied")]
    MissingRequired,

    #[error("failed to read the \"{0}\" image file")]
    ImageFile(String),

    #[error(transparent)]
    Fault(#[from] crashdebug::Fault),
}

/// The fully reconstructed crash world the session runs against.
#[derive(Debug)]
pub struct CommandLine {
    pub mem: MemorySim,
    pub context: RegisterContext,
}

#[derive(Default)]
struct Options<'a> {
    elf: Option<&'a str>,
    bin: Option<(&'a str, u32)>,
    dump: Option<&'a str>,
    aliases: Vec<(u32, u32, u32)>,
}

impl CommandLine {
    pub fn parse(args: &[String]) -> Result<Self, CommandLineError> {
        let options = gather_options(args)?;
        if (options.elf.is_none() && options.bin.is_none()) || options.dump.is_none() {
            return Err(CommandLineError::MissingRequired);
        }

        let mut mem = MemorySim::new();
        let mut context = RegisterContext::new();

        if let Some(path) = options.elf {
            let image = fs::read(path).map_err(|_| CommandLineError::ImageFile(path.into()))?;
            load_elf_image(&mut mem, &image)?;
        } else if let Some((path, base)) = options.bin {
            let image = fs::read(path).map_err(|_| CommandLineError::ImageFile(path.into()))?;
            load_bin_image(&mut mem, base, &image)?;
        }

        if let Some(path) = options.dump {
            load_dump(&mut mem, &mut context, path.as_ref())?;
        }

        // Aliases resolve against regions the dump just created, so they
        // must come last.
        for (base, size, redirect) in options.aliases {
            mem.create_alias(base, redirect, size)?;
        }

        Ok(Self { mem, context })
    }
}

fn gather_options(args: &[String]) -> Result<Options<'_>, CommandLineError> {
    let mut options = Options::default();
    let mut rest = args;
    while let Some((flag, tail)) = rest.split_first() {
        if flag.eq_ignore_ascii_case("--elf") {
            let (value, tail) = take_values::<1>(tail, "--elf")?;
            options.elf = Some(value[0]);
            rest = tail;
        } else if flag.eq_ignore_ascii_case("--bin") {
            let (value, tail) = take_values::<2>(tail, "--bin")?;
            options.bin = Some((value[0], parse_number(value[1])?));
            rest = tail;
        } else if flag.eq_ignore_ascii_case("--dump") {
            let (value, tail) = take_values::<1>(tail, "--dump")?;
            options.dump = Some(value[0]);
            rest = tail;
        } else if flag.eq_ignore_ascii_case("--alias") {
            let (value, tail) = take_values::<3>(tail, "--alias")?;
            options.aliases.push((
                parse_number(value[0])?,
                parse_number(value[1])?,
                parse_number(value[2])?,
            ));
            rest = tail;
        } else {
            return Err(CommandLineError::UnrecognizedArgument(flag.clone()));
        }
    }
    Ok(options)
}

fn take_values<'a, const N: usize>(
    args: &'a [String],
    flag: &'static str,
) -> Result<([&'a str; N], &'a [String]), CommandLineError> {
    if args.len() < N {
        return Err(CommandLineError::MissingValue(flag));
    }
    let mut values = [""; N];
    for (slot, value) in values.iter_mut().zip(args) {
        *slot = value.as_str();
    }
    Ok((values, &args[N..]))
}

/// C-style number scan: `0x` hex, leading-`0` octal, else decimal.
fn parse_number(text: &str) -> Result<u32, CommandLineError> {
    let bad = || CommandLineError::InvalidNumber(text.into());
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).map_err(|_| bad());
    }
    if text.len() > 1 && text.starts_with('0') {
        return u32::from_str_radix(&text[1..], 8).map_err(|_| bad());
    }
    text.parse().map_err(|_| bad())
}
