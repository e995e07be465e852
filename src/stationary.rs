use std::collections::VecDeque;

/// Sliding window over the most recent mean absolute frame differences
#[derive(Debug, Clone)]
pub struct StaticSceneWindow {
    capacity: usize,
    values: VecDeque<f64>,
}

impl StaticSceneWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a difference, evicting the oldest one when full
    pub fn push(&mut self, value: f64) {
        if self.capacity == 0 {
            return;
        }
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.values.len() == self.capacity
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    /// The scene is static once the window is full and its mean is below `threshold`
    pub fn is_static(&self, threshold: f64) -> bool {
        self.is_full() && self.mean().map_or(false, |mean| mean < threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_only_when_full() {
        let mut window = StaticSceneWindow::new(3);
        window.push(0.);
        window.push(0.);
        assert!(!window.is_static(1.));
        window.push(0.);
        assert!(window.is_static(1.));
        assert!(!window.is_static(0.));
    }

    #[test]
    fn test_eviction() {
        let mut window = StaticSceneWindow::new(2);
        for v in [10., 10., 0.5, 0.5, 0.5] {
            window.push(v);
            assert!(window.len() <= 2);
        }
        assert_eq!(window.mean(), Some(0.5));
        assert!(window.is_static(1.));

        window.push(f64::INFINITY);
        assert!(!window.is_static(1.));
    }
}
