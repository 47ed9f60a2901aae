mod ai;
mod bus;
pub mod controller;
pub mod cpu;
mod dp;
mod error;
mod mi;
mod pi;
mod pif;
mod rdp;
mod ri;
mod rsp;
mod scheduler;
mod si;
mod sp;
mod vi;

use serde::{Deserialize, Serialize};

use self::bus::Bus;
use self::controller::Controller;
use self::cpu::Cpu;
use self::scheduler::{EventType, Scheduler};

pub use self::error::Error;

use crate::util;

pub const CPU_FREQUENCY: i64 = 93_750_000;

/// Scheduler quantum: no component runs further than this ahead.
pub const MAX_RUN_CYCLES: i64 = 4096;

// Clock ratio PIF : CPU : RSP = 1 : 6 : 3.
const RSP_DIVIDER: i64 = 2;
const PIF_DIVIDER: i64 = 6;

const AUDIO_SAMPLE_RATE: i64 = 48_000;
const AUDIO_FRAME_CYCLES: i64 = CPU_FREQUENCY / AUDIO_SAMPLE_RATE;

// Coarse NTSC raster: 525 halflines per frame.
const VI_HALFLINE_CYCLES: i64 = CPU_FREQUENCY / 60 / 525;

// Keep at most a quarter second of queued audio if the host stalls.
const AUDIO_BUFFER_LIMIT: usize = (AUDIO_SAMPLE_RATE / 2) as usize;

#[derive(Deserialize, Serialize)]
pub struct System {
    cpu: Cpu,
    bus: Bus,
    scheduler: Scheduler,

    boot_path: String,
    pif_path: String,
    cart_path: String,

    pub running: bool,
    frame_ready: bool,

    audio_buffer: Vec<i16>,
}

impl System {
    pub fn new(boot_path: &str, pif_path: &str, cart_path: &str) -> System {
        let bus = Bus::new(
            util::read_file_to_box(boot_path),
            util::read_file_to_box(pif_path),
            util::read_file_to_box(cart_path),
        );

        System {
            cpu: Cpu::new(),
            bus,
            scheduler: Scheduler::new(),

            boot_path: String::from(boot_path),
            pif_path: String::from(pif_path),
            cart_path: String::from(cart_path),

            running: true,
            frame_ready: false,

            audio_buffer: Vec::new(),
        }
    }

    /// Re-reads the ROM images and rebuilds the page table after a
    /// save-state load.
    pub fn reload_host_files(&mut self) {
        self.bus.reload_host_files(
            util::read_file_to_box(&self.boot_path),
            util::read_file_to_box(&self.pif_path),
            util::read_file_to_box(&self.cart_path),
        );
    }

    pub fn reset(&mut self) {
        self.bus.reset();
        self.cpu.reset();
        self.scheduler.reset();

        self.scheduler
            .add_event(EventType::ViLine, 0, VI_HALFLINE_CYCLES);
        self.scheduler
            .add_event(EventType::AudioFrame, 0, AUDIO_FRAME_CYCLES);

        self.frame_ready = false;
        self.audio_buffer.clear();
    }

    pub fn get_controller(&mut self) -> &mut Controller {
        self.bus.pif().controller()
    }

    pub fn take_frame_ready(&mut self) -> bool {
        std::mem::take(&mut self.frame_ready)
    }

    pub fn drain_audio(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.audio_buffer)
    }

    /// Advances every processor by one scheduler quantum, then fires the
    /// events that became due inside it.
    pub fn run_quantum(&mut self) -> Result<(), Error> {
        let cycles = self.scheduler.get_run_cycles();

        self.cpu.run(&mut self.bus, cycles)?;
        self.bus.tick_rsp(cycles / RSP_DIVIDER)?;
        self.bus.tick_pif(cycles / PIF_DIVIDER)?;

        for (event_type, param, delay) in self.bus.take_pending_events() {
            self.scheduler.add_event(event_type, param, delay);
        }

        let deadline = self.scheduler.timestamp() + cycles;

        loop {
            let remaining = deadline - self.scheduler.timestamp();

            let Some((event_type, param)) = self.scheduler.next_event(remaining) else {
                break;
            };

            self.dispatch_event(event_type, param);
        }

        self.scheduler.finish_quantum(deadline - self.scheduler.timestamp());

        Ok(())
    }

    fn dispatch_event(&mut self, event_type: EventType, _param: i32) {
        match event_type {
            EventType::ViLine => {
                if self.bus.tick_vi_halfline() {
                    self.frame_ready = true;
                }

                self.scheduler
                    .add_event(EventType::ViLine, 0, VI_HALFLINE_CYCLES);
            }
            EventType::AiSample => {
                if let Some(delay) = self.bus.do_ai_sample() {
                    self.scheduler.add_event(EventType::AiSample, 0, delay);
                }
            }
            EventType::AudioFrame => {
                let samples = if self.bus.ai().is_enabled() {
                    self.bus.ai().samples()
                } else {
                    0
                };

                if self.audio_buffer.len() < AUDIO_BUFFER_LIMIT {
                    self.audio_buffer.push(samples as i16);
                    self.audio_buffer.push((samples >> 16) as i16);
                }

                self.scheduler
                    .add_event(EventType::AudioFrame, 0, AUDIO_FRAME_CYCLES);
            }
        }
    }

    pub fn get_display_size(&self) -> (u32, u32) {
        let width = match self.bus.vi().width() {
            0 => 320,
            width => width,
        };

        (width, self.bus.vi().height())
    }

    /// Converts the guest framebuffer into RGB24 for presentation.
    pub fn get_framebuffer(&self, buffer: &mut [u8]) {
        let (width, height) = self.get_display_size();

        let origin = self.bus.vi().origin() as usize;
        let ram = self.bus.ram();

        match self.bus.vi().format() {
            vi::FORMAT_RGBA5551 => {
                for index in 0..(width * height) as usize {
                    let offset = origin + 2 * index;

                    if offset + 2 > ram.len() {
                        break;
                    }

                    let pixel =
                        ((ram[offset] as u16) << 8) | ram[offset + 1] as u16;

                    buffer[3 * index] = ((pixel >> 11) as u8 & 0x1f) << 3;
                    buffer[3 * index + 1] = ((pixel >> 6) as u8 & 0x1f) << 3;
                    buffer[3 * index + 2] = ((pixel >> 1) as u8 & 0x1f) << 3;
                }
            }
            vi::FORMAT_RGBA8888 => {
                for index in 0..(width * height) as usize {
                    let offset = origin + 4 * index;

                    if offset + 4 > ram.len() {
                        break;
                    }

                    buffer[3 * index] = ram[offset];
                    buffer[3 * index + 1] = ram[offset + 1];
                    buffer[3 * index + 2] = ram[offset + 2];
                }
            }
            _ => buffer[..(3 * width * height) as usize].fill(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::scheduler::{EventType, Scheduler};

    #[test]
    fn quantum_constants_follow_the_clock_ratio() {
        assert_eq!(super::MAX_RUN_CYCLES / super::RSP_DIVIDER, 2048);
        assert_eq!(super::MAX_RUN_CYCLES / super::PIF_DIVIDER, 682);
    }

    #[test]
    fn scheduler_cursor_lands_on_the_quantum() {
        let mut scheduler = Scheduler::new();

        scheduler.add_event(EventType::ViLine, 0, 100);

        let deadline = scheduler.timestamp() + 4096;

        while scheduler.next_event(deadline - scheduler.timestamp()).is_some() {}

        scheduler.finish_quantum(deadline - scheduler.timestamp());

        assert_eq!(scheduler.timestamp(), 4096);
    }
}
