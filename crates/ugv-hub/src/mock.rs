//! Simulated sensor feed used when no vehicle is attached.
//!
//! Each [`MockTelemetry::tick`] advances simulated time by one 50 Hz period
//! and returns the partial update a real sensor bridge would produce: the
//! vehicle circles the origin at 5 m radius while gently rocking.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ugv_types::{
    Battery, Imu, LinkStatus, OccupancyGrid, Odometry, Point3, TelemetryUpdate,
};

/// Simulated seconds per tick.
pub const TICK_SECONDS: f64 = 0.02;

/// Default bound on the published path history.
pub const DEFAULT_PATH_CAPACITY: usize = 1000;

const ORBIT_RADIUS: f64 = 5.0;
const ORBIT_RATE: f64 = 0.1;

pub struct MockTelemetry {
    t: f64,
    path: VecDeque<Point3>,
    path_capacity: usize,
    grid_size: usize,
    grid_sent: bool,
    rng: StdRng,
}

impl MockTelemetry {
    pub fn new(path_capacity: usize, grid_size: usize) -> Self {
        Self::with_rng(path_capacity, grid_size, StdRng::from_entropy())
    }

    /// Deterministic feed for tests.
    pub fn seeded(path_capacity: usize, grid_size: usize, seed: u64) -> Self {
        Self::with_rng(path_capacity, grid_size, StdRng::seed_from_u64(seed))
    }

    fn with_rng(path_capacity: usize, grid_size: usize, rng: StdRng) -> Self {
        Self {
            t: 0.0,
            path: VecDeque::with_capacity(path_capacity.min(4096)),
            path_capacity: path_capacity.max(1),
            grid_size,
            grid_sent: false,
            rng,
        }
    }

    /// Simulated seconds since the feed started.
    pub fn elapsed(&self) -> f64 {
        self.t
    }

    /// Advance one period and produce the next update.
    ///
    /// The first tick also carries the occupancy grid and a `Connected`
    /// link status; later ticks leave both topics alone.
    pub fn tick(&mut self) -> TelemetryUpdate {
        self.t += TICK_SECONDS;
        let t = self.t;

        let imu = Imu {
            roll: (t * 0.5).sin() * 0.1,
            pitch: (t * 0.3).cos() * 0.1,
            yaw: t * 0.1,
        };

        let phase = t * ORBIT_RATE;
        let odometry = Odometry {
            x: phase.cos() * ORBIT_RADIUS,
            y: phase.sin() * ORBIT_RADIUS,
            z: 0.0,
            vx: -phase.sin() * ORBIT_RADIUS * ORBIT_RATE,
            vy: phase.cos() * ORBIT_RADIUS * ORBIT_RATE,
            vz: 0.0,
        };

        if self.path.len() >= self.path_capacity {
            self.path.pop_front();
        }
        self.path.push_back(Point3 {
            x: odometry.x,
            y: odometry.y,
            z: 0.0,
        });

        let battery = Battery {
            voltage: 24.5 + self.rng.gen_range(0.0..0.1),
            current: 1.5 + self.rng.gen_range(0.0..0.2),
            percentage: (85.0 - t * 0.1).max(0.0),
        };
        let latency = 15.0 + self.rng.gen_range(0.0..5.0);

        let mut update = TelemetryUpdate::new()
            .imu(imu)
            .odometry(odometry)
            .path(self.path.iter().copied().collect())
            .battery(battery)
            .latency(latency);

        if !self.grid_sent {
            self.grid_sent = true;
            update = update
                .occupancy_grid(self.generate_grid())
                .status(LinkStatus::Connected);
        }
        update
    }

    /// Random blocks, roughly one cell in five occupied, with the area
    /// around the vehicle's start cleared.
    fn generate_grid(&mut self) -> OccupancyGrid {
        let size = self.grid_size;
        let mut grid = OccupancyGrid::empty(size, size);
        for cell in grid.cells.iter_mut() {
            *cell = if self.rng.gen_bool(0.2) { 1.0 } else { 0.0 };
        }
        let lo = size * 2 / 5;
        let hi = size * 3 / 5;
        for y in lo..hi {
            for x in lo..hi {
                grid.cells[x + y * size] = 0.0;
            }
        }
        grid
    }
}

impl Default for MockTelemetry {
    fn default() -> Self {
        Self::new(DEFAULT_PATH_CAPACITY, ugv_types::telemetry::DEFAULT_GRID_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ugv_types::{TelemetryValue, Topic};

    fn value_of(update: &TelemetryUpdate, topic: Topic) -> Option<TelemetryValue> {
        update
            .clone()
            .into_iter()
            .find(|(t, _)| *t == topic)
            .map(|(_, v)| v)
    }

    #[test]
    fn first_tick_carries_grid_and_status() {
        let mut feed = MockTelemetry::seeded(10, 20, 7);
        let first = feed.tick();
        assert!(matches!(
            value_of(&first, Topic::OccupancyGrid),
            Some(TelemetryValue::OccupancyGrid(g)) if g.width == 20 && g.cells.len() == 400
        ));
        assert_eq!(
            value_of(&first, Topic::Status),
            Some(TelemetryValue::Status(LinkStatus::Connected))
        );

        let second = feed.tick();
        assert!(value_of(&second, Topic::OccupancyGrid).is_none());
        assert!(value_of(&second, Topic::Status).is_none());
    }

    #[test]
    fn grid_centre_is_clear() {
        let mut feed = MockTelemetry::seeded(10, 100, 3);
        let Some(TelemetryValue::OccupancyGrid(grid)) = value_of(&feed.tick(), Topic::OccupancyGrid)
        else {
            panic!("grid missing");
        };
        for y in 40..60 {
            for x in 40..60 {
                assert_eq!(grid.cell(x, y), Some(0.0));
            }
        }
        assert!(grid.cells.iter().all(|c| *c == 0.0 || *c == 1.0));
    }

    #[test]
    fn path_history_is_bounded() {
        let mut feed = MockTelemetry::seeded(5, 4, 1);
        let mut last = None;
        for _ in 0..12 {
            last = Some(feed.tick());
        }
        let Some(TelemetryValue::Path(path)) = value_of(&last.unwrap(), Topic::Path) else {
            panic!("path missing");
        };
        assert_eq!(path.len(), 5);
    }

    #[test]
    fn readings_stay_in_expected_ranges() {
        let mut feed = MockTelemetry::seeded(10, 4, 9);
        for _ in 0..50 {
            let update = feed.tick();
            if let Some(TelemetryValue::Latency(ms)) = value_of(&update, Topic::Latency) {
                assert!((15.0..20.0).contains(&ms));
            }
            if let Some(TelemetryValue::Battery(b)) = value_of(&update, Topic::Battery) {
                assert!((24.5..24.6).contains(&b.voltage));
            }
            if let Some(TelemetryValue::Odometry(o)) = value_of(&update, Topic::Odometry) {
                let r = (o.x * o.x + o.y * o.y).sqrt();
                assert!((r - ORBIT_RADIUS).abs() < 1e-9);
            }
        }
        assert!((feed.elapsed() - 1.0).abs() < 1e-9);
    }
}
