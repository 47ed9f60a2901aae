mod frontend;
mod n64;
mod util;

use std::env;
use std::process;

use log::error;

use crate::frontend::{Frontend, Options};
use crate::n64::System;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 4 {
        eprintln!("Usage: {} [boot ROM] [PIF ROM] [cartridge ROM]", args[0]);

        process::exit(1);
    }

    let mut system = System::new(&args[1], &args[2], &args[3]);
    system.reset();

    let mut frontend = Frontend::create();
    let mut options = Options::new();

    while system.running {
        if let Err(err) = system.run_quantum() {
            error!("{}", err);

            process::exit(1);
        }

        if system.take_frame_ready() {
            frontend.update(&mut options, &mut system);
            frontend.queue_audio(&mut system);
            frontend.render(&options, &system);
        }
    }
}
