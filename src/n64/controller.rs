use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize)]
pub struct Controller {
    pub button_a: bool,
    pub button_b: bool,
    pub button_z: bool,
    pub button_start: bool,
    pub button_dpad_up: bool,
    pub button_dpad_down: bool,
    pub button_dpad_left: bool,
    pub button_dpad_right: bool,
    pub button_l: bool,
    pub button_r: bool,
    pub button_c_up: bool,
    pub button_c_down: bool,
    pub button_c_left: bool,
    pub button_c_right: bool,

    pub stick_x: i8,
    pub stick_y: i8,
}

impl Controller {
    pub fn new() -> Controller {
        Controller {
            button_a: false,
            button_b: false,
            button_z: false,
            button_start: false,
            button_dpad_up: false,
            button_dpad_down: false,
            button_dpad_left: false,
            button_dpad_right: false,
            button_l: false,
            button_r: false,
            button_c_up: false,
            button_c_down: false,
            button_c_left: false,
            button_c_right: false,

            stick_x: 0,
            stick_y: 0,
        }
    }

    pub fn buttons(&self) -> u16 {
        let mut value = 0;

        value |= (self.button_a as u16) << 15;
        value |= (self.button_b as u16) << 14;
        value |= (self.button_z as u16) << 13;
        value |= (self.button_start as u16) << 12;
        value |= (self.button_dpad_up as u16) << 11;
        value |= (self.button_dpad_down as u16) << 10;
        value |= (self.button_dpad_left as u16) << 9;
        value |= (self.button_dpad_right as u16) << 8;
        value |= (self.button_l as u16) << 5;
        value |= (self.button_r as u16) << 4;
        value |= (self.button_c_up as u16) << 3;
        value |= (self.button_c_down as u16) << 2;
        value |= (self.button_c_left as u16) << 1;
        value |= self.button_c_right as u16;

        value
    }
}
