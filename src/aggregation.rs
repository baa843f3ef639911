//! Geodesic distance aggregation.
//!
//! Given the coordinates of every registered member, this module computes the
//! great-circle distance between each unordered pair of members (haversine
//! formula) and reduces the resulting sample set to min, max, mean and
//! population standard deviation.
//!
//! Everything here is a pure function of its input: no state is kept between
//! calls and nothing is cached, so concurrent requests can call in freely.
//! Cost is O(n²) in the number of coordinates.

use crate::model::{Coordinate, DistanceStatistics};

/// IUGG mean Earth radius in meters.
pub const EARTH_MEAN_RADIUS: f64 = 6_371_008.8;

/// Block size below which [`pairwise_sum`] stops splitting.
const PAIRWISE_BLOCK_SIZE: usize = 128;

/// Number of interleaved partial sums used inside a block.
const PAIRWISE_LANES: usize = 8;

/// Great-circle distance in meters between two coordinates.
pub fn great_circle_distance(a: Coordinate, b: Coordinate) -> f64 {
    haversine(
        (a.latitude.to_radians(), a.longitude.to_radians()),
        (b.latitude.to_radians(), b.longitude.to_radians()),
    )
}

/// Haversine distance between two `(latitude, longitude)` pairs in radians.
fn haversine((lat_a, lon_a): (f64, f64), (lat_b, lon_b): (f64, f64)) -> f64 {
    let half_lat = ((lat_a - lat_b) / 2.0).sin();
    let half_lon = ((lon_a - lon_b) / 2.0).sin();

    let radicand = half_lat * half_lat + lat_a.cos() * lat_b.cos() * (half_lon * half_lon);

    2.0 * EARTH_MEAN_RADIUS * radicand.sqrt().asin()
}

/// Compute the distance, in meters, between every unordered pair of coordinates.
///
/// Pairs are enumerated in upper-triangular order: `(0,1), (0,2), ..., (0,n-1),
/// (1,2), ..., (n-2,n-1)`. The output has `n·(n-1)/2` entries in that order and
/// is empty for fewer than two coordinates.
///
/// # Example
///
/// ```
/// use crunch::aggregation::compute_distance;
/// use crunch::model::Coordinate;
///
/// let distances = compute_distance(&[
///     Coordinate::new(0.0, 0.0),
///     Coordinate::new(0.0, 90.0),
///     Coordinate::new(90.0, 0.0),
/// ]);
///
/// assert_eq!(distances.len(), 3);
/// ```
pub fn compute_distance(coordinates: &[Coordinate]) -> Vec<f64> {
    let n = coordinates.len();
    if n < 2 {
        return Vec::new();
    }

    let radians: Vec<(f64, f64)> = coordinates
        .iter()
        .map(|c| (c.latitude.to_radians(), c.longitude.to_radians()))
        .collect();

    let mut distances = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n - 1 {
        for j in i + 1..n {
            distances.push(haversine(radians[i], radians[j]));
        }
    }

    distances
}

/// Reduce the pairwise distances of `coordinates` to summary statistics.
///
/// Returns [`DistanceStatistics::Insufficient`] when fewer than two
/// coordinates are given. The standard deviation is the population one
/// (divisor `n`).
pub fn aggregate(coordinates: &[Coordinate]) -> DistanceStatistics {
    if coordinates.len() < 2 {
        return DistanceStatistics::insufficient();
    }

    summarize(&compute_distance(coordinates))
}

/// Summary statistics of a non-empty sample set.
fn summarize(samples: &[f64]) -> DistanceStatistics {
    let count = samples.len() as f64;

    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = pairwise_sum(samples) / count;

    let squared_deviations: Vec<f64> = samples
        .iter()
        .map(|sample| {
            let deviation = sample - mean;
            deviation * deviation
        })
        .collect();
    let standard_deviation = (pairwise_sum(&squared_deviations) / count).sqrt();

    DistanceStatistics::Summary {
        min,
        max,
        mean,
        standard_deviation,
    }
}

/// Sum `values` with blocked pairwise summation.
///
/// Fewer than eight values are accumulated sequentially. Blocks of up to 128
/// values are accumulated in eight interleaved lanes that are then combined as
/// a balanced tree. Larger inputs are split in half (at a multiple of eight)
/// and each half summed recursively. Rounding error grows with `log n` instead
/// of `n`, and the result depends only on the order of `values`.
pub fn pairwise_sum(values: &[f64]) -> f64 {
    let n = values.len();

    if n < PAIRWISE_LANES {
        let mut sum = 0.0;
        for value in values {
            sum += value;
        }
        sum
    } else if n <= PAIRWISE_BLOCK_SIZE {
        let mut lanes = [0.0; PAIRWISE_LANES];
        lanes.copy_from_slice(&values[..PAIRWISE_LANES]);

        let unrolled = n - n % PAIRWISE_LANES;
        let mut i = PAIRWISE_LANES;
        while i < unrolled {
            for (lane, value) in lanes.iter_mut().zip(&values[i..i + PAIRWISE_LANES]) {
                *lane += value;
            }
            i += PAIRWISE_LANES;
        }

        let mut sum = ((lanes[0] + lanes[1]) + (lanes[2] + lanes[3]))
            + ((lanes[4] + lanes[5]) + (lanes[6] + lanes[7]));
        for value in &values[unrolled..] {
            sum += value;
        }
        sum
    } else {
        let mut half = n / 2;
        half -= half % PAIRWISE_LANES;
        pairwise_sum(&values[..half]) + pairwise_sum(&values[half..])
    }
}
