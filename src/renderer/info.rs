//! Render statistics.

use wgpu::PrimitiveTopology;

/// Per-frame draw counters plus live resource counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderInfo {
    /// Frames started with `begin_render` since creation.
    pub frame: u64,
    /// Driver draw calls issued.
    pub calls: u64,
    pub triangles: u64,
    pub lines: u64,
    pub points: u64,
    /// Items dropped because their program was pending or invalid.
    pub skipped: u64,
    /// Live program variants.
    pub programs: usize,
    /// Geometries with uploaded buffers.
    pub geometries: usize,
}

impl RenderInfo {
    /// Accounts one draw of `count` elements, repeated `instances` times.
    pub fn update(&mut self, topology: PrimitiveTopology, count: u32, instances: u32) {
        let count = u64::from(count) * u64::from(instances.max(1));
        self.calls += 1;
        match topology {
            PrimitiveTopology::TriangleList => self.triangles += count / 3,
            PrimitiveTopology::TriangleStrip => self.triangles += count.saturating_sub(2),
            PrimitiveTopology::LineList => self.lines += count / 2,
            PrimitiveTopology::LineStrip => self.lines += count.saturating_sub(1),
            PrimitiveTopology::PointList => self.points += count,
        }
    }

    /// Clears per-frame counters; frame and resource counts are kept.
    pub fn reset(&mut self) {
        self.calls = 0;
        self.triangles = 0;
        self.lines = 0;
        self.points = 0;
        self.skipped = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_accounting() {
        let mut info = RenderInfo::default();
        info.update(PrimitiveTopology::TriangleList, 36, 1);
        info.update(PrimitiveTopology::TriangleList, 6, 10);
        info.update(PrimitiveTopology::LineStrip, 5, 1);
        info.update(PrimitiveTopology::PointList, 7, 1);

        assert_eq!(info.calls, 4);
        assert_eq!(info.triangles, 12 + 20);
        assert_eq!(info.lines, 4);
        assert_eq!(info.points, 7);
    }

    #[test]
    fn test_reset_keeps_frame() {
        let mut info = RenderInfo {
            frame: 3,
            programs: 2,
            ..Default::default()
        };
        info.update(PrimitiveTopology::TriangleList, 3, 1);
        info.reset();
        assert_eq!(info.calls, 0);
        assert_eq!(info.frame, 3);
        assert_eq!(info.programs, 2);
    }
}
