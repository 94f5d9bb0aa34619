//! `crashdebug` executable: builds the crashed-device world from the
//! command line, then serves GDB over stdin/stdout until the debugger
//! goes away.

mod command_line;
mod logger;

use crashdebug::{run_session, StandardComm};

fn main() {
    logger::init();
    std::process::exit(run());
}

fn run() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut world = match command_line::CommandLine::parse(&args) {
        Ok(world) => world,
        Err(error) => {
            log::error!("{}", error);
            print_banner();
            print_usage();
            return 1;
        }
    };

    let mut comm = StandardComm::new();
    match run_session(&mut world.context, &mut world.mem, &mut comm) {
        Ok(()) => 0,
        Err(fault) => {
            log::error!("{}", fault);
            1
        }
    }
}

fn print_banner() {
    eprintln!(
        "CrashDebug - Cortex-M Post-Mortem Debugging Aid ({})\n",
        env!("CARGO_PKG_VERSION")
    );
}

fn print_usage() {
    eprintln!(
        "Usage: crashdebug (--elf elfFilename | --bin imageFilename baseAddress)\n\
         \x20                  --dump dumpFilename\n\
         \x20                 [--alias baseAddress size redirectAddress]\n\
         Where: NOTE: The --elf and --bin options are mutually exclusive.  Use one\n\
         \x20            or the other but not both.\n\
         \x20      --elf is used to provide the filename of the .elf image containing\n\
         \x20        the device's FLASH contents at the time of the crash.\n\
         \x20      --bin is used to provide the filename of the binary image loaded into\n\
         \x20        the device's FLASH when the crash occurred. These binary images are\n\
         \x20        typically generated by running:\n\
         \x20          \"arm-none-eabi-objcopy -O binary input.elf output.bin\"\n\
         \x20        The baseAddress parameter indicates where the contents of the .bin\n\
         \x20        file was loaded into FLASH.  This address will typically be\n\
         \x20        0x00000000 unless a boot loader was in use.\n\
         \x20      --dump is used to provide the filename of the crash dump which\n\
         \x20        contains the contents of RAM and the CPU registers at the time of\n\
         \x20        the crash.\n\
         \x20      --alias is used to trap memory accesses to the region defined\n\
         \x20        by baseAddress/size and redirect them to the region at\n\
         \x20        redirectAddress."
    );
}
