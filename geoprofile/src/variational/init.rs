//! Starting responsibilities for the variational optimisation.

use nalgebra::DVector;
use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const MAX_LLOYD_ITER: usize = 100;

/// How the first set of responsibilities is chosen.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Initialization {
    /// k-means++ seeding followed by Lloyd iterations; every observation is
    /// assigned wholly to its nearest centre. Clusters are numbered from the
    /// largest down.
    KMeans,
    /// Independent uniform responsibility rows, each normalised to one.
    #[default]
    Random,
}

impl Initialization {
    /// One responsibility row of length `n_components` per point.
    pub(crate) fn responsibilities<R: Rng>(
        self,
        points: &[DVector<f64>],
        n_components: usize,
        rng: &mut R,
    ) -> Vec<Vec<f64>> {
        match self {
            Self::KMeans => {
                let labels = by_size(&kmeans(points, n_components.min(points.len()), rng));
                labels
                    .into_iter()
                    .map(|label| {
                        let mut row = vec![0.0; n_components];
                        row[label] = 1.0;
                        row
                    })
                    .collect()
            }
            Self::Random => points
                .iter()
                .map(|_| random_row(n_components, rng))
                .collect(),
        }
    }
}

fn random_row<R: Rng>(n: usize, rng: &mut R) -> Vec<f64> {
    let row: Vec<f64> = (0..n).map(|_| rng.random::<f64>()).collect();
    let total: f64 = row.iter().sum();
    if total > 0.0 {
        row.into_iter().map(|r| r / total).collect()
    } else {
        #[allow(clippy::cast_precision_loss)]
        let uniform = 1.0 / n as f64;
        vec![uniform; n]
    }
}

/// Relabel so that cluster `0` is the largest, ties broken by first label.
fn by_size(labels: &[usize]) -> Vec<usize> {
    let k = labels.iter().max().map_or(0, |&l| l + 1);
    let mut sizes = vec![0_usize; k];
    for &label in labels {
        sizes[label] += 1;
    }
    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&i, &j| sizes[j].cmp(&sizes[i]));

    let mut relabel = vec![0; k];
    for (new, &old) in order.iter().enumerate() {
        relabel[old] = new;
    }
    labels.iter().map(|&l| relabel[l]).collect()
}

fn nearest(point: &DVector<f64>, centers: &[DVector<f64>]) -> (usize, f64) {
    centers
        .iter()
        .enumerate()
        .map(|(i, c)| (i, (point - c).norm_squared()))
        .fold((0, f64::INFINITY), |best, cur| {
            if cur.1 < best.1 {
                cur
            } else {
                best
            }
        })
}

/// k-means++: the first centre uniformly, every further one with probability
/// proportional to its squared distance from the closest chosen centre.
fn seed_centers<R: Rng>(points: &[DVector<f64>], k: usize, rng: &mut R) -> Vec<DVector<f64>> {
    let mut centers = Vec::with_capacity(k);
    centers.push(points[rng.random_range(0..points.len())].clone());

    let mut d2: Vec<f64> = points
        .iter()
        .map(|p| (p - &centers[0]).norm_squared())
        .collect();

    while centers.len() < k {
        let total: f64 = d2.iter().sum();
        let next = if total > 0.0 {
            let u = rng.random::<f64>() * total;
            let mut acc = 0.0;
            d2.iter()
                .position(|d| {
                    acc += d;
                    acc > u
                })
                .unwrap_or(points.len() - 1)
        } else {
            rng.random_range(0..points.len())
        };
        let center = points[next].clone();
        for (d, p) in d2.iter_mut().zip(points) {
            *d = d.min((p - &center).norm_squared());
        }
        centers.push(center);
    }
    centers
}

/// Cluster labels in `0..k` for every point.
pub(crate) fn kmeans<R: Rng>(points: &[DVector<f64>], k: usize, rng: &mut R) -> Vec<usize> {
    if points.is_empty() || k == 0 {
        return vec![0; points.len()];
    }
    let mut centers = seed_centers(points, k, rng);
    let mut labels: Vec<usize> = points.iter().map(|p| nearest(p, &centers).0).collect();

    for _ in 0..MAX_LLOYD_ITER {
        let dim = points[0].len();
        let mut sums = vec![DVector::<f64>::zeros(dim); k];
        let mut counts = vec![0_usize; k];
        for (p, &label) in points.iter().zip(&labels) {
            sums[label] += p;
            counts[label] += 1;
        }
        for ((center, sum), &count) in centers.iter_mut().zip(sums).zip(&counts) {
            // empty clusters keep their previous centre
            if count > 0 {
                #[allow(clippy::cast_precision_loss)]
                let mean = sum / count as f64;
                *center = mean;
            }
        }

        let next: Vec<usize> = points.iter().map(|p| nearest(p, &centers).0).collect();
        if next == labels {
            break;
        }
        labels = next;
    }
    labels
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    use super::*;

    fn two_blobs() -> Vec<DVector<f64>> {
        let mut points = Vec::new();
        for i in 0..10 {
            let t = f64::from(i) * 0.01;
            points.push(DVector::from_column_slice(&[t, -t]));
            points.push(DVector::from_column_slice(&[5.0 + t, 5.0 - t]));
        }
        points
    }

    #[test]
    fn kmeans_separates_blobs() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0x1234);
        let points = two_blobs();
        let labels = kmeans(&points, 2, &mut rng);

        let first = labels[0];
        let second = labels[1];
        assert_ne!(first, second);
        for (i, &label) in labels.iter().enumerate() {
            let expected = if i % 2 == 0 { first } else { second };
            assert_eq!(label, expected, "point {i}");
        }
    }

    #[test]
    fn kmeans_handles_duplicate_points() {
        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        let points = vec![DVector::from_column_slice(&[1.0, 1.0]); 5];
        let labels = kmeans(&points, 3, &mut rng);
        assert_eq!(labels.len(), 5);
        assert!(labels.iter().all(|&l| l < 3));
    }

    #[test]
    fn kmeans_rows_are_one_hot_even_with_more_components_than_points() {
        let mut rng = Xoshiro256Plus::seed_from_u64(11);
        let points = two_blobs()[..3].to_vec();
        let resp = Initialization::KMeans.responsibilities(&points, 10, &mut rng);

        assert_eq!(resp.len(), 3);
        for row in &resp {
            assert_eq!(row.len(), 10);
            assert::close(row.iter().sum::<f64>(), 1.0, 1e-12);
            assert_eq!(row.iter().filter(|&&r| r == 1.0).count(), 1);
        }
    }

    #[test]
    fn kmeans_rows_put_the_largest_cluster_first() {
        let mut rng = Xoshiro256Plus::seed_from_u64(5);
        let mut points = two_blobs();
        // make the blob at (5, 5) the larger one
        points.extend(
            (0..6).map(|i| DVector::from_column_slice(&[5.0, 5.0 + 0.01 * f64::from(i)])),
        );
        let resp = Initialization::KMeans.responsibilities(&points, 2, &mut rng);

        let counts: Vec<f64> = (0..2).map(|k| resp.iter().map(|r| r[k]).sum()).collect();
        assert_eq!(counts, vec![16.0, 10.0]);
        assert_eq!(resp[1][0], 1.0);
        assert_eq!(resp[0][1], 1.0);
    }

    #[test]
    fn relabelling_is_by_decreasing_size() {
        assert_eq!(by_size(&[2, 0, 2, 1, 2, 0]), vec![0, 1, 0, 2, 0, 1]);
        assert_eq!(by_size(&[1, 1, 0]), vec![0, 0, 1]);
        assert!(by_size(&[]).is_empty());
    }

    #[test]
    fn random_rows_sum_to_one() {
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let resp = Initialization::Random.responsibilities(&two_blobs(), 4, &mut rng);
        for row in &resp {
            assert::close(row.iter().sum::<f64>(), 1.0, 1e-12);
            assert!(row.iter().all(|r| (0.0..=1.0).contains(r)));
        }
    }

    #[test]
    fn same_seed_same_labels() {
        let points = two_blobs();
        let a = kmeans(&points, 4, &mut Xoshiro256Plus::seed_from_u64(99));
        let b = kmeans(&points, 4, &mut Xoshiro256Plus::seed_from_u64(99));
        assert_eq!(a, b);
    }
}
