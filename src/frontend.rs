use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use log::{error, info};

use sdl2::audio::{AudioQueue, AudioSpecDesired};
use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::WindowCanvas;
use sdl2::EventPump;

use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::n64::System;

const FRAME_TIME: f64 = 1.0 / 60.0;

const MAX_WIDTH: u32 = 640;
const MAX_HEIGHT: u32 = 512;

pub struct Options {
    pub frame_limit: bool,
    pub state_index: usize,
}

impl Options {
    pub fn new() -> Options {
        Options {
            frame_limit: true,
            state_index: 0,
        }
    }
}

pub struct Frontend {
    canvas: WindowCanvas,
    event_pump: EventPump,

    audio_queue: AudioQueue<i16>,

    last_frame: Instant,

    framebuffer: Box<[u8]>,
}

impl Frontend {
    pub fn create() -> Frontend {
        let context = sdl2::init().unwrap();
        let video = context.video().unwrap();
        let audio = context.audio().unwrap();

        let window = video
            .window("rn64", 2 * 320, 2 * 256)
            .position_centered()
            .build()
            .unwrap();

        let canvas = window.into_canvas().build().unwrap();

        let desired = AudioSpecDesired {
            freq: Some(48_000),
            channels: Some(2),
            samples: Some(1024),
        };

        let audio_queue = audio.open_queue(None, &desired).unwrap();
        audio_queue.resume();

        Frontend {
            canvas,
            event_pump: context.event_pump().unwrap(),

            audio_queue,

            last_frame: Instant::now(),

            framebuffer: vec![0; (MAX_WIDTH * MAX_HEIGHT * 3) as usize].into_boxed_slice(),
        }
    }

    pub fn update(&mut self, options: &mut Options, system: &mut System) {
        let events: Vec<Event> = self.event_pump.poll_iter().collect();

        for event in events {
            match event {
                Event::KeyDown {
                    keycode: Some(keycode),
                    ..
                } => self.handle_keydown(keycode, system),
                Event::KeyUp {
                    keycode: Some(keycode),
                    ..
                } => self.handle_keyup(keycode, options, system),
                Event::Quit { .. } => system.running = false,
                _ => {}
            }
        }
    }

    fn handle_keydown(&mut self, keycode: Keycode, system: &mut System) {
        let controller = system.get_controller();

        match keycode {
            Keycode::W => controller.button_dpad_up = true,
            Keycode::A => controller.button_dpad_left = true,
            Keycode::S => controller.button_dpad_down = true,
            Keycode::D => controller.button_dpad_right = true,
            Keycode::Q => controller.button_l = true,
            Keycode::E => controller.button_r = true,
            Keycode::Return => controller.button_start = true,
            Keycode::LShift => controller.button_z = true,
            Keycode::Kp2 => controller.button_a = true,
            Keycode::Kp4 => controller.button_b = true,
            Keycode::I => controller.button_c_up = true,
            Keycode::K => controller.button_c_down = true,
            Keycode::J => controller.button_c_left = true,
            Keycode::L => controller.button_c_right = true,
            Keycode::Up => controller.stick_y = 80,
            Keycode::Down => controller.stick_y = -80,
            Keycode::Left => controller.stick_x = -80,
            Keycode::Right => controller.stick_x = 80,
            _ => {}
        }
    }

    fn handle_keyup(&mut self, keycode: Keycode, options: &mut Options, system: &mut System) {
        match keycode {
            Keycode::Tab => options.frame_limit ^= true,
            Keycode::F2 => system.reset(),
            Keycode::F6 => Frontend::load_state(system, options.state_index),
            Keycode::F7 => Frontend::save_state(system, options.state_index),
            Keycode::Comma => {
                options.state_index += 1;
                options.state_index %= 10;

                info!("[FRONTEND] Using save slot {}", options.state_index);
            }
            _ => {}
        }

        let controller = system.get_controller();

        match keycode {
            Keycode::W => controller.button_dpad_up = false,
            Keycode::A => controller.button_dpad_left = false,
            Keycode::S => controller.button_dpad_down = false,
            Keycode::D => controller.button_dpad_right = false,
            Keycode::Q => controller.button_l = false,
            Keycode::E => controller.button_r = false,
            Keycode::Return => controller.button_start = false,
            Keycode::LShift => controller.button_z = false,
            Keycode::Kp2 => controller.button_a = false,
            Keycode::Kp4 => controller.button_b = false,
            Keycode::I => controller.button_c_up = false,
            Keycode::K => controller.button_c_down = false,
            Keycode::J => controller.button_c_left = false,
            Keycode::L => controller.button_c_right = false,
            Keycode::Up | Keycode::Down => controller.stick_y = 0,
            Keycode::Left | Keycode::Right => controller.stick_x = 0,
            _ => {}
        }
    }

    fn load_state(system: &mut System, index: usize) {
        let name = format!("./states/slot{}.state", index);
        let path = Path::new(&name);

        if !path.exists() {
            info!("[FRONTEND] No file for save state {}", index);
            return;
        }

        if let Ok(file) = File::open(path) {
            let mut bytes = Vec::new();

            let mut decompressor = XzDecoder::new(file);
            decompressor.read_to_end(&mut bytes).unwrap();

            *system = rmp_serde::from_slice(&bytes).unwrap();
            system.reload_host_files();

            info!("[FRONTEND] Loaded state {}", index);
        } else {
            error!("[FRONTEND] Unable to open save state file");
        }
    }

    fn save_state(system: &mut System, index: usize) {
        let name = format!("./states/slot{}.state", index);
        let path = Path::new(&name);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("unable to create path to save state file");
        }

        if let Ok(file) = File::create(path) {
            let bytes = rmp_serde::to_vec(system).expect("unable to serialize state");

            let mut compressor = XzEncoder::new(file, 6);
            compressor.write_all(&bytes).unwrap();

            info!("[FRONTEND] Saved state {}", index);
        } else {
            error!("[FRONTEND] Unable to create save state file");
        }
    }

    pub fn render(&mut self, options: &Options, system: &System) {
        let (width, height) = system.get_display_size();

        system.get_framebuffer(&mut self.framebuffer);

        let texture_creator = self.canvas.texture_creator();
        let mut texture = texture_creator
            .create_texture_streaming(PixelFormatEnum::RGB24, width, height)
            .unwrap();

        texture
            .update(None, &self.framebuffer[..(width * height * 3) as usize], (width * 3) as usize)
            .unwrap();

        self.canvas.clear();
        self.canvas.copy(&texture, None, None).unwrap();
        self.canvas.present();

        if options.frame_limit {
            let elapsed = self.last_frame.elapsed().as_secs_f64();

            if elapsed < FRAME_TIME {
                std::thread::sleep(Duration::from_secs_f64(FRAME_TIME - elapsed));
            }
        }

        self.last_frame = Instant::now();
    }

    pub fn queue_audio(&mut self, system: &mut System) {
        let samples = system.drain_audio();

        if !samples.is_empty() {
            self.audio_queue.queue_audio(&samples).unwrap();
        }
    }
}
