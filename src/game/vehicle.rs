//! Truck dynamics: control input + elapsed time -> next vehicle state

use glam::Vec3;
use std::f32::consts::TAU;

use crate::util::time::SIMULATION_TPS;

use super::ControlInput;

/// Dynamics constants for the racing truck
#[derive(Debug, Clone, Copy)]
pub struct VehicleParams {
    /// Maximum forward speed in m/s (~200 km/h)
    pub max_speed: f32,
    /// Forward acceleration in m/s²
    pub acceleration: f32,
    /// Braking deceleration in m/s², stronger than acceleration
    pub braking: f32,
    /// Reverse acceleration in m/s²
    pub reverse_acceleration: f32,
    /// Reverse speed cap as a fraction of `max_speed`
    pub reverse_speed_fraction: f32,
    /// Wheel angle change per second while a steer key is held
    pub steer_rate: f32,
    /// Wheel angle bound in radians
    pub max_wheel_angle: f32,
    /// Fraction of the wheel angle kept per reference tick when no steer key is held
    pub wheel_return: f32,
    /// Yaw rate per (radian of wheel angle × m/s of forward speed)
    pub steer_gain: f32,
    /// Lowest steering effectiveness, reached at `max_speed`
    pub high_speed_steer_floor: f32,
    /// Below this forward speed steering has no effect
    pub min_steer_speed: f32,
    /// Velocity-proportional drag per second while coasting
    pub coast_drag: f32,
    /// Sideways velocity decay rate per second (tyre grip)
    pub lateral_grip: f32,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            max_speed: 55.0,
            acceleration: 10.0,
            braking: 16.0,
            reverse_acceleration: 5.0,
            reverse_speed_fraction: 0.3,
            steer_rate: 1.5,
            max_wheel_angle: 0.5,
            wheel_return: 0.9,
            steer_gain: 0.15,
            high_speed_steer_floor: 0.2,
            min_steer_speed: 0.5,
            coast_drag: 0.4,
            lateral_grip: 8.0,
        }
    }
}

impl VehicleParams {
    pub fn max_reverse_speed(&self) -> f32 {
        self.max_speed * self.reverse_speed_fraction
    }

    /// Steering effectiveness at the given forward speed: 1.0 at rest,
    /// falling linearly to `high_speed_steer_floor` at `max_speed`
    pub fn steer_factor(&self, forward_speed: f32) -> f32 {
        (1.0 - forward_speed.abs() / self.max_speed).max(self.high_speed_steer_floor)
    }
}

/// Kinematic state of one truck
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleState {
    pub position: Vec3,
    /// Euler angles in radians; only `y` (yaw) is driven by the simulation
    pub rotation: Vec3,
    pub velocity: Vec3,
    /// Horizontal speed in m/s
    pub speed: f32,
    /// Visual wheel angle; negative is left
    pub wheel_angle: f32,
}

impl VehicleState {
    pub fn at_rest(position: Vec3, yaw: f32) -> Self {
        Self {
            position,
            rotation: Vec3::new(0.0, yaw, 0.0),
            velocity: Vec3::ZERO,
            speed: 0.0,
            wheel_angle: 0.0,
        }
    }

    pub fn yaw(&self) -> f32 {
        self.rotation.y
    }

    /// Unit vector the truck is pointing along
    pub fn forward(&self) -> Vec3 {
        forward_from_yaw(self.rotation.y)
    }

    /// Signed speed along the heading; negative when reversing
    pub fn forward_speed(&self) -> f32 {
        self.velocity.dot(self.forward())
    }

    pub fn speed_kmh(&self) -> f32 {
        self.speed * 3.6
    }

    /// Stop dead at `position`, keeping the current heading
    pub fn stop_at(&mut self, position: Vec3) {
        self.position = position;
        self.velocity = Vec3::ZERO;
        self.speed = 0.0;
        self.wheel_angle = 0.0;
    }
}

fn forward_from_yaw(yaw: f32) -> Vec3 {
    Vec3::new(yaw.sin(), 0.0, yaw.cos())
}

fn horizontal_speed(velocity: Vec3) -> f32 {
    (velocity.x * velocity.x + velocity.z * velocity.z).sqrt()
}

/// Steps a truck forward in time.
///
/// Pure: no I/O, the input state is never mutated.
#[derive(Debug, Clone, Copy)]
pub struct VehicleDynamics {
    params: VehicleParams,
    max_delta: f32,
}

impl VehicleDynamics {
    pub fn new(params: VehicleParams, max_delta: f32) -> Self {
        Self { params, max_delta }
    }

    pub fn params(&self) -> &VehicleParams {
        &self.params
    }

    /// Advance `state` by `dt` seconds under `input`.
    ///
    /// Non-positive or NaN deltas return the state unchanged; deltas above the
    /// configured maximum are clamped so a stalled frame cannot blow up the
    /// integration.
    pub fn step(&self, state: &VehicleState, input: ControlInput, dt: f32) -> VehicleState {
        if !(dt > 0.0) {
            return *state;
        }
        let dt = dt.min(self.max_delta);
        let p = &self.params;

        let forward = state.forward();
        let forward_speed = state.velocity.dot(forward);
        let mut velocity = state.velocity;

        // Pedals. Braking wins over the throttle while rolling forward.
        let braking = input.brake && forward_speed > 0.0;
        if input.accelerate && !braking && forward_speed < p.max_speed {
            velocity += forward * p.acceleration * dt;
        }
        if input.brake {
            if forward_speed > 0.0 {
                let decel = (p.braking * dt).min(forward_speed);
                velocity -= forward * decel;
            } else if forward_speed > -p.max_reverse_speed() {
                velocity -= forward * p.reverse_acceleration * dt;
            }
        }

        // Wheel angle ramps while held, recentres otherwise
        let mut wheel_angle = state.wheel_angle;
        let steer_step = p.steer_rate * dt;
        if input.steer_left {
            wheel_angle = (wheel_angle - steer_step).max(-p.max_wheel_angle);
        } else if input.steer_right {
            wheel_angle = (wheel_angle + steer_step).min(p.max_wheel_angle);
        } else {
            wheel_angle *= p.wheel_return.powf(dt * SIMULATION_TPS as f32);
            if wheel_angle.abs() < 1e-4 {
                wheel_angle = 0.0;
            }
        }

        let mut yaw = state.rotation.y;
        let pedal_speed = velocity.dot(forward);
        if pedal_speed.abs() > p.min_steer_speed && wheel_angle != 0.0 {
            let yaw_rate = wheel_angle * p.steer_factor(pedal_speed) * pedal_speed * p.steer_gain;
            yaw = (yaw + yaw_rate * dt).rem_euclid(TAU);
        }

        if !input.has_pedal() {
            let keep = (1.0 - p.coast_drag * dt).max(0.0);
            velocity.x *= keep;
            velocity.z *= keep;
        }

        // Re-project onto the new heading: grip bleeds off sideways motion
        // and the forward component is held inside the speed envelope.
        let heading = forward_from_yaw(yaw);
        let along = velocity.dot(heading);
        let lateral = Vec3::new(velocity.x, 0.0, velocity.z) - heading * along;
        let along = along.clamp(-p.max_reverse_speed(), p.max_speed);
        let velocity = heading * along + lateral * (-p.lateral_grip * dt).exp();

        // Semi-implicit Euler: integrate position with the updated velocity
        let position = state.position + velocity * dt;

        VehicleState {
            position,
            rotation: Vec3::new(state.rotation.x, yaw, state.rotation.z),
            velocity,
            speed: horizontal_speed(velocity),
            wheel_angle,
        }
    }
}

impl Default for VehicleDynamics {
    fn default() -> Self {
        Self::new(VehicleParams::default(), 0.1)
    }
}
