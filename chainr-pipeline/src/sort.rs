//! Orders a pipeline's jobs so dependencies always precede their
//! dependents (spec §4.2: "for any pair (i,j) with i<j, job j must not be
//! a dependency of job i unless a cycle makes this impossible").

use std::collections::HashMap;

use crate::model::Job;

/// Returns job names in an order consistent with the dependency relation.
/// A stable pairwise pass: whenever a dependency is found sitting after
/// its dependent, it is moved in front of it. Bounded to `n` passes so a
/// cyclic or dangling reference degrades to best-effort order instead of
/// looping forever — the resulting order is still useful, since the
/// dependency-tree check downstream is what actually rejects cycles.
pub fn topological_sort(jobs: &HashMap<String, Job>) -> Vec<String> {
    let mut order: Vec<String> = jobs.keys().cloned().collect();
    order.sort();

    let n = order.len();
    for _ in 0..n {
        let mut changed = false;
        for i in 0..order.len() {
            let Some(job) = jobs.get(&order[i]) else {
                continue;
            };
            for dep in &job.depends_on {
                if let Some(dep_pos) = order.iter().position(|name| name == &dep.job) {
                    if dep_pos > i {
                        let dep_name = order.remove(dep_pos);
                        order.insert(i, dep_name);
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }

    order
}
