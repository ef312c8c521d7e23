//! # Sample Buffering
//!
//! Live storage for the lead currently being recorded.
//!
//! - **Accumulator**: every sample since the last `DATA:START` or flush.
//!   Flushed into the lead recording on `BUFFER:FULL`, `DATA:END` or stop.
//! - **Display window**: the most recent [`DISPLAY_WINDOW_LEN`] samples for
//!   the live preview. Untouched by `DATA:START` and flushes.

/// Number of samples kept for the live preview
pub const DISPLAY_WINDOW_LEN: usize = 500;

#[derive(Debug, Default)]
pub struct SampleBuffer {
    accumulator: Vec<i32>,
    display: Vec<i32>,
}

/// Value range helpers for sample slices, used to scale previews
pub trait SampleSliceExt<T> {
    fn min_max_value(&self) -> Option<(T, T)>;
}

impl<T: PartialOrd + Copy> SampleSliceExt<T> for [T] {
    fn min_max_value(&self) -> Option<(T, T)> {
        self.iter().fold(None, |acc, &value| match acc {
            None => Some((value, value)),
            Some((min, max)) => Some((
                if value < min { value } else { min },
                if value > max { value } else { max },
            )),
        })
    }
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_sample_line(&mut self, values: &[i32]) {
        self.accumulator.extend_from_slice(values);
        self.push_display(values);
    }

    pub fn on_single_sample(&mut self, value: i32) {
        self.on_sample_line(&[value]);
    }

    /// Start of a new segment: drop the accumulator, keep the preview
    pub fn on_data_start(&mut self) {
        self.accumulator.clear();
    }

    /// Hand over the accumulator contents, leaving it empty.
    ///
    /// Always returns what is there, including nothing.
    pub fn flush(&mut self) -> Vec<i32> {
        std::mem::take(&mut self.accumulator)
    }

    /// Feed the preview without touching the accumulator
    pub fn push_display(&mut self, values: &[i32]) {
        self.display.extend_from_slice(values);
        if self.display.len() > DISPLAY_WINDOW_LEN {
            let excess = self.display.len() - DISPLAY_WINDOW_LEN;
            self.display.drain(..excess);
        }
    }

    pub fn clear_display(&mut self) {
        self.display.clear();
    }

    pub fn accumulated(&self) -> &[i32] {
        &self.accumulator
    }

    pub fn display_window(&self) -> &[i32] {
        &self.display
    }

    /// The last `n` samples of the display window
    pub fn last_samples(&self, n: usize) -> &[i32] {
        &self.display[self.display.len().saturating_sub(n)..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_reach_both_buffers() {
        let mut buffer = SampleBuffer::new();
        buffer.on_sample_line(&[1, 2, 3]);
        buffer.on_single_sample(4);

        assert_eq!(buffer.accumulated(), &[1, 2, 3, 4]);
        assert_eq!(buffer.display_window(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_data_start_keeps_display() {
        let mut buffer = SampleBuffer::new();
        buffer.on_sample_line(&[5, 6]);
        buffer.on_data_start();

        assert!(buffer.accumulated().is_empty());
        assert_eq!(buffer.display_window(), &[5, 6]);
    }

    #[test]
    fn test_flush_empties_accumulator() {
        let mut buffer = SampleBuffer::new();
        buffer.on_sample_line(&[7, 8, 9]);

        assert_eq!(buffer.flush(), vec![7, 8, 9]);
        assert!(buffer.accumulated().is_empty());
        assert_eq!(buffer.flush(), Vec::<i32>::new());
        assert_eq!(buffer.display_window(), &[7, 8, 9]);
    }

    #[test]
    fn test_display_window_is_bounded() {
        let mut buffer = SampleBuffer::new();
        let first: Vec<i32> = (0..450).collect();
        let second: Vec<i32> = (450..620).collect();
        buffer.on_sample_line(&first);
        buffer.on_sample_line(&second);

        let window = buffer.display_window();
        assert_eq!(window.len(), DISPLAY_WINDOW_LEN);
        assert_eq!(window.first(), Some(&120));
        assert_eq!(window.last(), Some(&619));
        assert!(window.windows(2).all(|pair| pair[1] == pair[0] + 1));
        assert_eq!(buffer.accumulated().len(), 620);
    }

    #[test]
    fn test_single_oversized_line() {
        let mut buffer = SampleBuffer::new();
        let values: Vec<i32> = (0..1200).collect();
        buffer.on_sample_line(&values);

        assert_eq!(buffer.display_window(), &values[700..]);
    }

    #[test]
    fn test_last_samples() {
        let mut buffer = SampleBuffer::new();
        buffer.on_sample_line(&[1, 2, 3]);
        assert_eq!(buffer.last_samples(2), &[2, 3]);
        assert_eq!(buffer.last_samples(10), &[1, 2, 3]);
    }

    #[test]
    fn test_min_max_value() {
        assert_eq!([3, -1, 7].as_slice().min_max_value(), Some((-1, 7)));
        assert_eq!([0.5, -2.5].as_slice().min_max_value(), Some((-2.5, 0.5)));
        assert_eq!(Vec::<i32>::new().as_slice().min_max_value(), None);
    }
}
