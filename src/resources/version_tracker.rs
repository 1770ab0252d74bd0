//! Version counters used by the caches to detect changes without diffing data.

/// Monotonic change counter.
///
/// Every cache in the renderer stores the version it last observed and compares
/// it against the current one, so bumping is the only way to signal a change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChangeTracker {
    version: u64,
}

impl ChangeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self { version: 0 }
    }

    /// Starts at a given version (e.g. `1` for "already uploaded once").
    #[must_use]
    pub fn starting_at(version: u64) -> Self {
        Self { version }
    }

    /// Marks as modified, increments version by 1
    pub fn changed(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    /// Gets the current version number
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Write guard that bumps a [`ChangeTracker`] when it goes out of scope.
///
/// Handed out by accessors such as [`Material::uniforms_mut`], so any edit made
/// through the guard is observed by the uniform-upload cache.
///
/// [`Material::uniforms_mut`]: crate::resources::Material::uniforms_mut
pub struct TrackedMut<'a, T> {
    data: &'a mut T,
    tracker: &'a mut ChangeTracker,
}

impl<'a, T> TrackedMut<'a, T> {
    pub fn new(data: &'a mut T, tracker: &'a mut ChangeTracker) -> Self {
        Self { data, tracker }
    }
}

impl<T> std::ops::Deref for TrackedMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl<T> std::ops::DerefMut for TrackedMut<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data
    }
}

impl<T> Drop for TrackedMut<'_, T> {
    fn drop(&mut self) {
        self.tracker.changed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_bumps_on_drop() {
        let mut value = 1.0_f32;
        let mut tracker = ChangeTracker::new();
        {
            let mut guard = TrackedMut::new(&mut value, &mut tracker);
            *guard = 2.0;
        }
        assert_eq!(tracker.version(), 1);
        assert!((value - 2.0).abs() < f32::EPSILON);
    }
}
