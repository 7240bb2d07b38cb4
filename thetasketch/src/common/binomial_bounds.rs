// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Confidence bounds on the number of distinct values seen by a sketch that retained
//! `num_samples` hashes under sampling fraction `theta`.
//!
//! Large sample counts use the continuity-corrected Gaussian ("classic") interval. Below
//! [`LARGE_SAMPLE_THRESHOLD`] the binomial distribution is too skewed for that, so the bound is
//! found by inverting the exact binomial tail: the lower bound is the smallest population `N`
//! whose probability of producing at least `num_samples` samples reaches the one-sided tail
//! mass `delta`, and the upper bound is the largest `N` whose probability of producing at most
//! `num_samples` samples still reaches `delta`. Both regimes agree closely at the threshold.

use crate::common::NumStdDev;
use crate::error::Error;

/// One-sided tail mass of the standard normal beyond 0, 1, 2 and 3 standard deviations.
#[allow(clippy::excessive_precision)]
const DELTA_OF_NUM_STD_DEV: [f64; 4] = [
    0.5000000000000000000,
    0.1586553191586026479,
    0.0227502618904135701,
    0.0013498126861731796,
];

/// Sample counts above this use the Gaussian approximation.
const LARGE_SAMPLE_THRESHOLD: u64 = 120;

/// Sampling fractions above this behave as exact counting.
const THETA_NEAR_ONE: f64 = 1.0 - 1e-5;

/// Returns the approximate lower bound on the number of distinct values.
///
/// # Errors
///
/// Returns an error if `theta` is not in `(0.0, 1.0]`.
pub fn lower_bound(num_samples: u64, theta: f64, num_std_dev: NumStdDev) -> Result<f64, Error> {
    check_theta(theta)?;
    let n = num_samples as f64;
    let estimate = n / theta;
    let lb = approx_lower_bound(num_samples, theta, num_std_dev);
    Ok(estimate.min(n.max(lb)))
}

/// Returns the approximate upper bound on the number of distinct values.
///
/// `no_data_seen` is true for a sketch that never accepted an update; its bound is zero.
///
/// # Errors
///
/// Returns an error if `theta` is not in `(0.0, 1.0]`.
pub fn upper_bound(
    num_samples: u64,
    theta: f64,
    num_std_dev: NumStdDev,
    no_data_seen: bool,
) -> Result<f64, Error> {
    check_theta(theta)?;
    if no_data_seen {
        return Ok(0.0);
    }
    let estimate = num_samples as f64 / theta;
    let ub = approx_upper_bound(num_samples, theta, num_std_dev);
    Ok(estimate.max(ub))
}

fn check_theta(theta: f64) -> Result<(), Error> {
    if theta > 0.0 && theta <= 1.0 {
        Ok(())
    } else {
        Err(Error::config(format!("theta must be in (0.0, 1.0], got {theta}")))
    }
}

fn approx_lower_bound(num_samples: u64, theta: f64, num_std_dev: NumStdDev) -> f64 {
    let delta = DELTA_OF_NUM_STD_DEV[num_std_dev.as_u8() as usize];
    if theta == 1.0 {
        num_samples as f64
    } else if num_samples == 0 {
        0.0
    } else if num_samples == 1 {
        // P(at least one sample out of N) = 1 - (1 - theta)^N
        ((1.0 - delta).ln() / (-theta).ln_1p()).floor()
    } else if num_samples > LARGE_SAMPLE_THRESHOLD {
        classic_lower_bound(num_samples as f64, theta, num_std_dev.as_f64()) - 0.5
    } else if theta > THETA_NEAR_ONE {
        num_samples as f64
    } else {
        exact_lower_bound(num_samples, theta, delta) as f64
    }
}

fn approx_upper_bound(num_samples: u64, theta: f64, num_std_dev: NumStdDev) -> f64 {
    let delta = DELTA_OF_NUM_STD_DEV[num_std_dev.as_u8() as usize];
    if theta == 1.0 {
        num_samples as f64
    } else if num_samples == 0 {
        // P(no samples out of N) = (1 - theta)^N
        (delta.ln() / (-theta).ln_1p()).ceil()
    } else if num_samples > LARGE_SAMPLE_THRESHOLD {
        classic_upper_bound(num_samples as f64, theta, num_std_dev.as_f64()) + 0.5
    } else if theta > THETA_NEAR_ONE {
        (num_samples + 1) as f64
    } else {
        exact_upper_bound(num_samples, theta, delta) as f64
    }
}

/// Continuity-corrected Gaussian lower bound.
fn classic_lower_bound(num_samples: f64, theta: f64, num_std_dev: f64) -> f64 {
    let n_hat = (num_samples - 0.5) / theta;
    let b = num_std_dev * ((1.0 - theta) / theta).sqrt();
    let d = 0.5 * b * (b * b + 4.0 * n_hat).sqrt();
    let center = n_hat + 0.5 * b * b;
    center - d
}

/// Continuity-corrected Gaussian upper bound.
fn classic_upper_bound(num_samples: f64, theta: f64, num_std_dev: f64) -> f64 {
    let n_hat = (num_samples + 0.5) / theta;
    let b = num_std_dev * ((1.0 - theta) / theta).sqrt();
    let d = 0.5 * b * (b * b + 4.0 * n_hat).sqrt();
    let center = n_hat + 0.5 * b * b;
    center + d
}

/// `P(X <= k)` for `X ~ Binomial(trials, p)`, summed in log space so that huge `trials` and
/// tiny `p` do not underflow the leading terms.
fn binomial_cdf(k: u64, trials: u64, p: f64) -> f64 {
    if k >= trials {
        return 1.0;
    }
    let ln_p = p.ln();
    let ln_q = (-p).ln_1p();
    let mut ln_term = trials as f64 * ln_q;
    let mut sum = ln_term.exp();
    for i in 1..=k {
        ln_term += ((trials - i + 1) as f64 / i as f64).ln() + ln_p - ln_q;
        sum += ln_term.exp();
    }
    sum.min(1.0)
}

/// Smallest `N >= n` with `P(Binomial(N, p) >= n) >= delta`, capped at `u64::MAX`. Requires
/// `n >= 1`.
fn exact_lower_bound(n: u64, p: f64, delta: f64) -> u64 {
    let reaches = |trials: u64| 1.0 - binomial_cdf(n - 1, trials, p) >= delta;
    if reaches(n) {
        return n;
    }
    // At N = n / p the mean is n, so the tail is about one half, well above any delta in use.
    let mut lo = n;
    let mut hi = ((n as f64 / p).ceil() as u64).max(n + 1);
    while !reaches(hi) {
        if hi == u64::MAX {
            return hi;
        }
        lo = hi;
        hi = hi.saturating_mul(2);
    }
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if reaches(mid) {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    hi
}

/// Largest `N >= n` with `P(Binomial(N, p) <= n) >= delta`, capped at `u64::MAX`.
fn exact_upper_bound(n: u64, p: f64, delta: f64) -> u64 {
    let reaches = |trials: u64| binomial_cdf(n, trials, p) >= delta;
    let mut lo = n;
    let mut hi = (((n + 1) as f64 / p).ceil() as u64).max(n + 1);
    while reaches(hi) {
        // theta is so small that no representable population is ruled out
        if hi == u64::MAX {
            return hi;
        }
        lo = hi;
        hi = hi.saturating_mul(2);
    }
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if reaches(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}
