//! Deterministic k-means over embedding vectors.
//!
//! Output quality is not this engine's concern; determinism is. Seeding is
//! farthest-point (no RNG), distance is cosine, and iterations are capped.

const MAX_ITERATIONS: usize = 25;

/// Assign each vector to one of `k` clusters. Returns one cluster index per
/// input vector. With fewer vectors than clusters, each vector gets its own.
pub fn kmeans(vectors: &[Vec<f32>], k: usize) -> Vec<usize> {
    if vectors.is_empty() || k == 0 {
        return Vec::new();
    }
    if vectors.len() <= k {
        return (0..vectors.len()).collect();
    }

    let mut centroids = seed_centroids(vectors, k);
    let mut assignments = vec![0usize; vectors.len()];

    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (i, v) in vectors.iter().enumerate() {
            let nearest = nearest_centroid(v, &centroids);
            if assignments[i] != nearest {
                assignments[i] = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }
        recompute_centroids(vectors, &assignments, &mut centroids);
    }

    assignments
}

/// Farthest-point seeding: start from the first vector, then repeatedly take
/// the vector farthest from all chosen centroids.
fn seed_centroids(vectors: &[Vec<f32>], k: usize) -> Vec<Vec<f32>> {
    let mut centroids = vec![vectors[0].clone()];
    while centroids.len() < k {
        let farthest = vectors
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                let da = min_distance(a, &centroids);
                let db = min_distance(b, &centroids);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
            .unwrap_or(0);
        centroids.push(vectors[farthest].clone());
    }
    centroids
}

fn min_distance(v: &[f32], centroids: &[Vec<f32>]) -> f32 {
    centroids
        .iter()
        .map(|c| cosine_distance(v, c))
        .fold(f32::INFINITY, f32::min)
}

fn nearest_centroid(v: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = cosine_distance(v, c);
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    best
}

fn recompute_centroids(vectors: &[Vec<f32>], assignments: &[usize], centroids: &mut [Vec<f32>]) {
    let dim = vectors[0].len();
    for (cluster, centroid) in centroids.iter_mut().enumerate() {
        let members: Vec<&Vec<f32>> = vectors
            .iter()
            .zip(assignments)
            .filter(|(_, a)| **a == cluster)
            .map(|(v, _)| v)
            .collect();
        // An emptied cluster keeps its previous centroid.
        if members.is_empty() {
            continue;
        }
        let mut mean = vec![0.0f32; dim];
        for v in &members {
            for (m, x) in mean.iter_mut().zip(v.iter()) {
                *m += x;
            }
        }
        for m in &mut mean {
            *m /= members.len() as f32;
        }
        *centroid = mean;
    }
}

pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}
