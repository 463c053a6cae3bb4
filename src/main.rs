use std::process::ExitCode;

use unwoff2::{FontFormat, decode};

fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args();
    let (Some(infile), Some(outfile)) = (args.nth(1), args.next()) else {
        eprintln!("usage: unwoff2 <input.woff2|input.woff> <output>");
        return ExitCode::from(2);
    };

    log::info!("Reading from {infile}");
    let woff = match std::fs::read(&infile) {
        Ok(woff) => woff,
        Err(err) => {
            eprintln!("{infile}: {err}");
            return ExitCode::FAILURE;
        }
    };

    log::info!("Decoding {:?}", FontFormat::detect(&woff));
    let otf = match decode(&woff) {
        Ok(otf) => otf,
        Err(err) => {
            eprintln!("{infile}: {}", err.code());
            log::error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    log::info!("Writing to {outfile}");
    if let Err(err) = std::fs::write(&outfile, otf) {
        eprintln!("{outfile}: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
