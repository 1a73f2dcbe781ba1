// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the furnace-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! PLC register address map
//!
//! Symbolic names for every coil and register used by the furnace and
//! trigger PLCs, defined once as an immutable compile-time table. Names
//! match the PLC firmware configuration, without the `mod_` prefix.
//!
//! Address ranges follow the Modbus convention used by the firmware:
//! coils start at 1, input registers at 30001, holding registers at 40001.
//! Every floating-point value spans two consecutive 16-bit registers.

// Furnace PLC coils
pub const PID_ENABLE_A_COIL: u16 = 1;
pub const PID_ENABLE_B_COIL: u16 = 2;
pub const GRADIENT_ENABLE_COIL: u16 = 3;
pub const AUTOSP_ENABLE_COIL: u16 = 4;
pub const AUTOSP_HEATING_COIL: u16 = 5;
pub const MOTOR_ENABLE_COIL: u16 = 6;
pub const MOTOR_DIRECTION_COIL: u16 = 7;
pub const GRADIENT_HIGH_COIL: u16 = 8;
pub const ACQUISITION_COIL: u16 = 9;
pub const GRADIENT_UPDATE_COIL: u16 = 10;
pub const FREQ_ASPC_UPDATE_COIL: u16 = 11;
pub const SETPOINT_UPDATE_COIL: u16 = 12;

// Furnace PLC input registers (read-only, from device)
pub const COUNTER_INP: u16 = 30001;
pub const PID_OUTPUT_A_INP: u16 = 30003;
pub const PID_OUTPUT_B_INP: u16 = 30005;
pub const PID_OUTPUTSUM_A_INP: u16 = 30007;
pub const PID_OUTPUTSUM_B_INP: u16 = 30009;
pub const THERMOCOUPLE_A_INP: u16 = 30011;
pub const THERMOCOUPLE_B_INP: u16 = 30013;
pub const THERMOCOUPLE_C_INP: u16 = 30015;
pub const THERMOCOUPLE_D_INP: u16 = 30017;
pub const GRADIENT_ACTUAL_INP: u16 = 30019;
pub const GRADIENT_THEORY_INP: u16 = 30021;
pub const AUTOSP_MIDPT_INP: u16 = 30023;
pub const MOTOR_LVDT_INP: u16 = 30027;

// Furnace PLC holding registers (read/write)
pub const PID_SETPOINT_A_HOLD: u16 = 40001;
pub const PID_KP_A_HOLD: u16 = 40003;
pub const PID_KI_A_HOLD: u16 = 40005;
pub const PID_KD_A_HOLD: u16 = 40007;
pub const PID_SETPOINT_B_HOLD: u16 = 40009;
pub const PID_KP_B_HOLD: u16 = 40011;
pub const PID_KI_B_HOLD: u16 = 40013;
pub const PID_KD_B_HOLD: u16 = 40015;
pub const FURNACE_FREQ_HOLD: u16 = 40017;
pub const GRADIENT_WANTED_HOLD: u16 = 40019;
pub const GRADIENT_DISTANCE_HOLD: u16 = 40021;
pub const AUTOSP_RATE_HOLD: u16 = 40023;
pub const AUTOSP_IMGDEGREE_HOLD: u16 = 40025;
pub const MOTOR_SPEED_HOLD: u16 = 40027;

/// Addresses for one PID heater channel.
#[derive(Debug, Clone, Copy)]
pub struct PidAddresses {
    pub enable_coil: u16,
    pub setpoint_hold: u16,
    pub kp_hold: u16,
    pub ki_hold: u16,
    pub kd_hold: u16,
    pub output_inp: u16,
    pub outputsum_inp: u16,
    pub thermocouple_inp: u16,
    pub setpoint_update_coil: u16,
}

pub const PID_A: PidAddresses = PidAddresses {
    enable_coil: PID_ENABLE_A_COIL,
    setpoint_hold: PID_SETPOINT_A_HOLD,
    kp_hold: PID_KP_A_HOLD,
    ki_hold: PID_KI_A_HOLD,
    kd_hold: PID_KD_A_HOLD,
    output_inp: PID_OUTPUT_A_INP,
    outputsum_inp: PID_OUTPUTSUM_A_INP,
    thermocouple_inp: THERMOCOUPLE_A_INP,
    setpoint_update_coil: SETPOINT_UPDATE_COIL,
};

pub const PID_B: PidAddresses = PidAddresses {
    enable_coil: PID_ENABLE_B_COIL,
    setpoint_hold: PID_SETPOINT_B_HOLD,
    kp_hold: PID_KP_B_HOLD,
    ki_hold: PID_KI_B_HOLD,
    kd_hold: PID_KD_B_HOLD,
    output_inp: PID_OUTPUT_B_INP,
    outputsum_inp: PID_OUTPUTSUM_B_INP,
    thermocouple_inp: THERMOCOUPLE_B_INP,
    setpoint_update_coil: SETPOINT_UPDATE_COIL,
};

/// Addresses for the thermal gradient control.
#[derive(Debug, Clone, Copy)]
pub struct GradientAddresses {
    pub enable_coil: u16,
    pub wanted_hold: u16,
    pub distance_hold: u16,
    pub actual_inp: u16,
    pub theory_inp: u16,
    /// Which heater is the high end of the gradient, read as an index.
    pub high_coil: u16,
    pub update_coil: u16,
}

pub const GRADIENT: GradientAddresses = GradientAddresses {
    enable_coil: GRADIENT_ENABLE_COIL,
    wanted_hold: GRADIENT_WANTED_HOLD,
    distance_hold: GRADIENT_DISTANCE_HOLD,
    actual_inp: GRADIENT_ACTUAL_INP,
    theory_inp: GRADIENT_THEORY_INP,
    high_coil: GRADIENT_HIGH_COIL,
    update_coil: GRADIENT_UPDATE_COIL,
};

/// Addresses for auto set-point control.
#[derive(Debug, Clone, Copy)]
pub struct AspcAddresses {
    pub enable_coil: u16,
    pub heating_coil: u16,
    pub rate_hold: u16,
    pub midpt_inp: u16,
    pub imgdegree_hold: u16,
    pub update_coil: u16,
}

pub const ASPC: AspcAddresses = AspcAddresses {
    enable_coil: AUTOSP_ENABLE_COIL,
    heating_coil: AUTOSP_HEATING_COIL,
    rate_hold: AUTOSP_RATE_HOLD,
    midpt_inp: AUTOSP_MIDPT_INP,
    imgdegree_hold: AUTOSP_IMGDEGREE_HOLD,
    update_coil: FREQ_ASPC_UPDATE_COIL,
};

/// Addresses for the sample motor.
#[derive(Debug, Clone, Copy)]
pub struct MotorAddresses {
    pub enable_coil: u16,
    pub direction_coil: u16,
    pub speed_hold: u16,
    pub lvdt_inp: u16,
}

pub const MOTOR: MotorAddresses = MotorAddresses {
    enable_coil: MOTOR_ENABLE_COIL,
    direction_coil: MOTOR_DIRECTION_COIL,
    speed_hold: MOTOR_SPEED_HOLD,
    lvdt_inp: MOTOR_LVDT_INP,
};

// Trigger PLC coils. Enable/disable are one-shot flags handled by the
// firmware; running coils are read-only status.
pub const TRIG_ENABLE_ALL_COIL: u16 = 0;
pub const TRIG_DISABLE_ALL_COIL: u16 = 1;
pub const TRIG_VAL_UPDATED_COIL: u16 = 14;
pub const TRIG_PREVIEW_COIL: u16 = 15;

/// Addresses for one trigger timer on the trigger PLC.
#[derive(Debug, Clone, Copy)]
pub struct TriggerAddresses {
    pub enable_coil: u16,
    pub disable_coil: u16,
    pub running_coil: u16,
    pub freq_hold: u16,
    pub target_hold: u16,
}

/// Address block for trigger timer `index` (0..=3).
pub const fn trigger_addresses(index: u16) -> TriggerAddresses {
    TriggerAddresses {
        enable_coil: 2 + index,
        disable_coil: 6 + index,
        running_coil: 10 + index,
        freq_hold: 40001 + index * 2,
        target_hold: 40009 + index * 2,
    }
}
