use crate::error::TrackError::{self, AssignmentError, LapjvError};

/* -----------------------------------------------------------------------------
 * lapjv.rs - Jonker-Volgenant linear assignment algorithm
 *
 * Dense solver plus a rectangular, cost-limited wrapper used by the track
 * assigner: pairs whose cost exceeds the limit come back unmatched (-1)
 * instead of failing the whole assignment.
 * ----------------------------------------------------------------------------- */

const LARGE: f64 = 1e6;

fn column_reduction(
    n: usize,
    cost: &[Vec<f64>],
    free_rows: &mut [usize],
    x: &mut [isize],
    v: &mut [f64],
    y: &mut [isize],
) -> usize {
    debug_assert!(cost.len() == n, "cost.len() must be equal to {}", n);
    debug_assert!(x.len() == n, "x.len() must be equal to {}", n);
    debug_assert!(y.len() == n, "y.len() must be equal to {}", n);
    debug_assert!(v.len() == n, "v.len() must be equal to {}", n);

    for i in 0..n {
        x[i] = -1;
        v[i] = LARGE;
        y[i] = 0;
    }
    for i in 0..n {
        for j in 0..n {
            let c = cost[i][j];
            if c < v[j] {
                v[j] = c;
                y[j] = i as isize;
            }
        }
    }

    let mut unique = vec![true; n];
    let mut j = n;
    debug_assert!(j > 0, "n must be greater than 0");
    while j > 0 {
        j -= 1;
        let i = y[j] as usize;
        if x[i] < 0 {
            x[i] = j as isize;
        } else {
            unique[i] = false;
            y[j] = -1;
        }
    }

    let mut n_free_rows = 0;
    for i in 0..n {
        if x[i] < 0 {
            free_rows[n_free_rows] = i;
            n_free_rows += 1;
        } else if unique[i] {
            let j = x[i] as usize;
            let mut min = LARGE;
            for j2 in 0..n {
                if j2 == j {
                    continue;
                }
                let c = cost[i][j2] - v[j2];
                if c < min {
                    min = c;
                }
            }
            v[j] -= min;
        }
    }
    n_free_rows
}

fn augmenting_row_reduction(
    n: usize,
    cost: &[Vec<f64>],
    n_free_rows: usize,
    free_rows: &mut [usize],
    x: &mut [isize],
    y: &mut [isize],
    v: &mut [f64],
) -> usize {
    let mut current = 0;
    let mut new_free_rows = 0;
    let mut rr_cnt = 0;

    while current < n_free_rows {
        rr_cnt += 1;
        let free_i = free_rows[current];
        current += 1;

        let mut j1 = 0;
        let mut j2 = -1;
        let mut v1 = cost[free_i][0] - v[0];
        let mut v2 = LARGE;

        for j in 1..n {
            let c = cost[free_i][j] - v[j];
            if c < v2 {
                if c >= v1 {
                    v2 = c;
                    j2 = j as isize;
                } else {
                    v2 = v1;
                    v1 = c;
                    j2 = j1;
                    j1 = j as isize;
                }
            }
        }

        let mut i0 = y[j1 as usize];
        let v1_new = v[j1 as usize] - (v2 - v1);
        let v1_lowers = v1_new < v[j1 as usize];

        if rr_cnt < current * n {
            if v1_lowers {
                v[j1 as usize] = v1_new;
            } else if i0 >= 0 && j2 >= 0 {
                j1 = j2;
                i0 = y[j2 as usize];
            }

            if i0 >= 0 {
                if v1_lowers {
                    current -= 1;
                    free_rows[current] = i0 as usize;
                } else {
                    free_rows[new_free_rows] = i0 as usize;
                    new_free_rows += 1;
                }
            }
        } else if i0 >= 0 {
            free_rows[new_free_rows] = i0 as usize;
            new_free_rows += 1;
        }
        x[free_i] = j1;
        y[j1 as usize] = free_i as isize;
    }
    new_free_rows
}

fn split_minima(n: usize, lo: usize, d: &[f64], cols: &mut [usize]) -> usize {
    debug_assert!(d.len() == n, "d.len() must be equal to n");
    debug_assert!(cols.len() == n, "cols.len() must be equal to n");
    let mut hi = lo + 1;
    let mut mind = d[cols[lo]];
    for k in hi..n {
        let j = cols[k];
        if d[j] <= mind {
            if d[j] < mind {
                hi = lo;
                mind = d[j];
            }
            cols[k] = cols[hi];
            cols[hi] = j;
            hi += 1;
        }
    }
    hi
}

#[allow(clippy::too_many_arguments)]
fn scan_columns(
    n: usize,
    cost: &[Vec<f64>],
    plo: &mut usize,
    phi: &mut usize,
    d: &mut [f64],
    cols: &mut [usize],
    pred: &mut [usize],
    y: &[isize],
    v: &[f64],
) -> isize {
    let mut lo = *plo;
    let mut hi = *phi;

    while lo != hi {
        let mut j = cols[lo];
        lo += 1;

        let i = y[j] as usize;
        let mind = d[j];
        debug_assert!(y[j] >= 0, "y[j] must be greater than or equal to 0");

        let h = cost[i][j] - v[j] - mind;
        for k in hi..n {
            j = cols[k];
            let cred_ij = cost[i][j] - v[j] - h;
            if cred_ij < d[j] {
                d[j] = cred_ij;
                pred[j] = i;
                if cred_ij == mind {
                    if y[j] < 0 {
                        return j as isize;
                    }
                    cols[k] = cols[hi];
                    cols[hi] = j;
                    hi += 1;
                }
            }
        }
    }
    *plo = lo;
    *phi = hi;
    -1
}

fn find_path(
    n: usize,
    cost: &[Vec<f64>],
    start_i: usize,
    y: &mut [isize],
    v: &mut [f64],
    pred: &mut [usize],
) -> isize {
    let mut lo = 0;
    let mut hi = 0;
    let mut final_j = -1;
    let mut n_ready = 0;
    let mut cols = vec![0; n];
    let mut d = vec![0.0; n];

    for i in 0..n {
        cols[i] = i;
        pred[i] = start_i;
        d[i] = cost[start_i][i] - v[i];
    }

    while final_j == -1 {
        if lo == hi {
            n_ready = lo;
            hi = split_minima(n, lo, &d, &mut cols);
            for k in lo..hi {
                let j = cols[k];
                if y[j] < 0 {
                    final_j = j as isize;
                }
            }
        }
        if final_j == -1 {
            final_j = scan_columns(
                n, cost, &mut lo, &mut hi, &mut d, &mut cols, pred, y, v,
            );
        }
    }

    {
        let mind = d[cols[lo]];
        for k in 0..n_ready {
            let j = cols[k];
            v[j] += d[j] - mind;
        }
    }
    final_j
}

fn augment(
    n: usize,
    cost: &[Vec<f64>],
    n_free_rows: usize,
    free_rows: &[usize],
    x: &mut [isize],
    y: &mut [isize],
    v: &mut [f64],
) -> usize {
    let mut pred = vec![0; n];

    for &free_row in free_rows.iter().take(n_free_rows) {
        let mut i = -1isize;
        let mut k = 0;

        let mut j = find_path(n, cost, free_row, y, v, &mut pred);
        debug_assert!(j >= 0, "j must be greater than or equal to 0");
        debug_assert!(j < n as isize, "j must be less than n as isize");
        while i != free_row as isize {
            i = pred[j as usize] as isize;
            y[j as usize] = i;

            std::mem::swap(&mut x[i as usize], &mut j);

            k += 1;
            debug_assert!(k <= n, "k must be less than or equal to n");
        }
    }
    0
}

/// Solve a dense square assignment problem.
///
/// `x[i]` receives the column assigned to row `i`, `y[j]` the row assigned to
/// column `j`.
pub(crate) fn lapjv(
    cost: &[Vec<f64>],
    x: &mut [isize],
    y: &mut [isize],
) -> Result<(), TrackError> {
    let n = cost.len();
    if n == 0 {
        return Err(LapjvError("cost matrix must not be empty".to_string()));
    }
    if n != x.len() || n != y.len() {
        return Err(LapjvError(format!(
            "cost.len() must be equal to x.len() and y.len(), but cost.len() = {}, x.len() = {}, y.len() = {}",
            n,
            x.len(),
            y.len()
        )));
    }

    let mut free_rows = vec![0; n];
    let mut v = vec![0.0; n];
    let mut ret = column_reduction(n, cost, &mut free_rows, x, &mut v, y);
    let mut i = 0;
    while ret > 0 && i < 2 {
        ret = augmenting_row_reduction(
            n, cost, ret, &mut free_rows, x, y, &mut v,
        );
        i += 1;
    }
    if ret > 0 {
        ret = augment(n, cost, ret, &free_rows, x, y, &mut v);
    }
    if ret > 0 {
        return Err(LapjvError(format!(
            "unassigned rows remain after augmentation: {}",
            ret
        )));
    }
    Ok(())
}

/// Rectangular assignment with a cost limit.
///
/// The matrix is embedded into a square one of size `rows + cols`, padded so
/// that any real pairing of cost above `cost_limit` loses against staying
/// unmatched. Returns per-row and per-column assignments with -1 for
/// unmatched entries.
pub(crate) fn linear_assignment(
    cost: &[Vec<f64>],
    cost_limit: f64,
) -> Result<(Vec<isize>, Vec<isize>), TrackError> {
    let n_rows = cost.len();
    let n_cols = if n_rows == 0 { 0 } else { cost[0].len() };
    if n_rows == 0 || n_cols == 0 {
        return Ok((vec![-1; n_rows], vec![-1; n_cols]));
    }
    if !cost_limit.is_finite() {
        return Err(AssignmentError("cost limit must be finite".to_string()));
    }

    let n = n_rows + n_cols;
    let mut padded = vec![vec![cost_limit / 2.0; n]; n];
    for row in padded.iter_mut().skip(n_rows) {
        for c in row.iter_mut().skip(n_cols) {
            *c = 0.0;
        }
    }
    for (i, row) in cost.iter().enumerate() {
        debug_assert!(
            row.len() == n_cols,
            "cost matrix rows must have equal length"
        );
        padded[i][..n_cols].copy_from_slice(row);
    }

    let mut x = vec![-1; n];
    let mut y = vec![-1; n];
    lapjv(&padded, &mut x, &mut y)?;

    let mut rowsol = vec![-1; n_rows];
    let mut colsol = vec![-1; n_cols];
    for i in 0..n_rows {
        if x[i] >= 0 && (x[i] as usize) < n_cols {
            rowsol[i] = x[i];
        }
    }
    for j in 0..n_cols {
        if y[j] >= 0 && (y[j] as usize) < n_rows {
            colsol[j] = y[j];
        }
    }
    Ok((rowsol, colsol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_lapjv_3x3() {
        let cost = vec![
            vec![1.0, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
            vec![7.0, 8.0, 9.0],
        ];
        let mut x = vec![-1; 3];
        let mut y = vec![-1; 3];
        let res = lapjv(&cost, &mut x, &mut y);
        assert!(res.is_ok(), "expected Ok, got {:?}", res);
        assert_eq!(x, vec![2, 0, 1]);
        assert_eq!(y, vec![1, 2, 0]);
    }

    #[test]
    fn test_lapjv_4x4() {
        let cost = vec![
            vec![1., 2., 3., 4.],
            vec![5., 6., 7., 8.],
            vec![9., 10., 11., 12.],
            vec![13., 14., 15., 16.],
        ];
        let mut x = vec![-1; 4];
        let mut y = vec![-1; 4];
        let res = lapjv(&cost, &mut x, &mut y);
        assert!(res.is_ok(), "expected Ok, got {:?}", res);
        assert_eq!(x, vec![3, 0, 1, 2]);
        assert_eq!(y, vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_lapjv_5x5() {
        let cost = vec![
            vec![1., 2., 3., 4., 1.],
            vec![5., 6., 7., 8., 2.],
            vec![9., 10., 11., 12., 3.],
            vec![13., 14., 15., 16., 4.],
            vec![17., 18., 19., 20., 5.],
        ];
        let mut x = vec![-1; 5];
        let mut y = vec![-1; 5];
        let res = lapjv(&cost, &mut x, &mut y);
        assert!(res.is_ok(), "expected Ok, got {:?}", res);
        assert_eq!(x, vec![0, 2, 1, 3, 4]);
        assert_eq!(y, vec![0, 2, 1, 3, 4]);
    }

    #[test]
    fn test_linear_assignment_rectangular() {
        let cost = vec![vec![1.0, 10.0, 10.0], vec![10.0, 1.0, 10.0]];
        let (rowsol, colsol) = linear_assignment(&cost, 100.0).unwrap();
        assert_eq!(rowsol, vec![0, 1]);
        assert_eq!(colsol, vec![0, 1, -1]);
    }

    #[test]
    fn test_linear_assignment_cost_limit() {
        let cost = vec![vec![1.0, 50.0], vec![50.0, 50.0]];
        let (rowsol, colsol) = linear_assignment(&cost, 10.0).unwrap();
        assert_eq!(rowsol, vec![0, -1]);
        assert_eq!(colsol, vec![0, -1]);
    }

    #[test]
    fn test_linear_assignment_empty() {
        let (rowsol, colsol) = linear_assignment(&[], 10.0).unwrap();
        assert!(rowsol.is_empty());
        assert!(colsol.is_empty());
    }

    #[test]
    fn test_quickcheck_lapjv() {
        fn prop(_: usize) -> bool {
            let mut rng = rand::thread_rng();
            let n = rng.gen_range(1..=50);
            let cost: Vec<Vec<f64>> = (0..n)
                .map(|_| (0..n).map(|_| rng.gen_range(0.0..1.0)).collect())
                .collect();
            let mut x = vec![-1; n];
            let mut y = vec![-1; n];
            if lapjv(&cost, &mut x, &mut y).is_err() {
                return false;
            }
            // a permutation: every row and column matched exactly once
            let mut seen = vec![false; n];
            for &j in x.iter() {
                if j < 0 || seen[j as usize] {
                    return false;
                }
                seen[j as usize] = true;
            }
            x.iter()
                .enumerate()
                .all(|(i, &j)| y[j as usize] == i as isize)
        }
        quickcheck::quickcheck(prop as fn(usize) -> bool);
    }
}
