//! Per-channel audio level measurement

/// Peak level of the left and right channel of an interleaved stereo batch
///
/// This is the signed maximum, not the maximum magnitude: a channel whose
/// samples are all negative reports 0. A trailing unpaired sample is ignored.
pub fn peak_levels(samples: &[i16]) -> (i16, i16) {
    let mut max_left = 0i16;
    let mut max_right = 0i16;

    for frame in samples.chunks_exact(2) {
        max_left = max_left.max(frame[0]);
        max_right = max_right.max(frame[1]);
    }

    (max_left, max_right)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_per_channel() {
        let samples = [100, -5, 300, 20, -7000, 10];
        assert_eq!(peak_levels(&samples), (300, 20));
    }

    #[test]
    fn test_negative_excursions_not_counted() {
        let samples = [-30000, -1, -20000, -2];
        assert_eq!(peak_levels(&samples), (0, 0));
    }

    #[test]
    fn test_odd_and_empty() {
        assert_eq!(peak_levels(&[]), (0, 0));
        assert_eq!(peak_levels(&[5]), (0, 0));
        assert_eq!(peak_levels(&[5, 6, 9000]), (5, 6));
    }
}
