use crate::engine::hyperrectangle::HyperrectangleSet;
use crate::engine::index::SpatialIndex;

/// A maximal group of rows transitively linked by tolerance overlap.
///
/// `members` are table row ids (not box ids), sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub members: Vec<usize>,
}

impl Component {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Smallest row id in the component, used as its ordering key.
    pub fn first(&self) -> usize {
        self.members[0]
    }
}

/// Splits the boxes of `rects` into connected components of the overlap graph.
///
/// The graph is never materialized, neighbours are discovered by querying
/// `index` as the traversal goes. Seeds are taken in ascending box order, so
/// components come out ordered by their smallest row id and the result only
/// depends on the input order.
pub fn connected_components(rects: &HyperrectangleSet, index: &SpatialIndex) -> Vec<Component> {
    debug_assert_eq!(rects.len(), index.len());
    let n = rects.len();
    let mut seen = vec![false; n];
    let mut stack: Vec<u32> = Vec::new();
    let mut neighbours: Vec<u32> = Vec::new();
    let mut out = Vec::new();

    for seed in 0..n {
        if seen[seed] {
            continue;
        }
        seen[seed] = true;
        stack.push(seed as u32);
        let mut members = Vec::new();

        while let Some(current) = stack.pop() {
            let current = current as usize;
            members.push(rects.row_id(current));
            index.query_into(rects.get(current), &mut neighbours);
            for &next in neighbours.iter() {
                let next_idx = next as usize;
                if !seen[next_idx] {
                    seen[next_idx] = true;
                    stack.push(next);
                }
            }
        }

        members.sort_unstable();
        out.push(Component { members });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::hyperrectangle::{
        build_hyperrectangles,
        MatchDimensions,
    };
    use crate::models::{
        FeatureRow,
        FeatureTable,
        TableSchema,
        Tolerance,
        ToleranceMap,
    };

    fn components_for(values: &[f64], tol: Tolerance, capacity: usize) -> Vec<Vec<usize>> {
        let schema = TableSchema::new(vec!["PrecMz".into()], vec![]);
        let rows = values
            .iter()
            .map(|v| FeatureRow::new(vec![*v], vec![]))
            .collect();
        let table = FeatureTable::try_from_rows(schema.clone(), rows).unwrap();
        let mut tols = ToleranceMap::new();
        tols.insert("PrecMz".into(), tol);
        let dims = MatchDimensions::resolve(&schema, &["PrecMz".into()], &tols).unwrap();
        let built = build_hyperrectangles(&table, &dims).unwrap();
        let index = SpatialIndex::bulk_load(&built.rects, capacity).unwrap();
        connected_components(&built.rects, &index)
            .into_iter()
            .map(|c| c.members)
            .collect()
    }

    #[test]
    fn test_chains_are_transitive() {
        // 1 overlaps 2 and 2 overlaps 3 but 1 does not overlap 3.
        let out = components_for(&[1.0, 2.0, 3.0, 10.0], Tolerance::Window(0.6), 4);
        assert_eq!(out, vec![vec![0, 1, 2], vec![3]]);
    }

    #[test]
    fn test_ordered_by_smallest_member() {
        let out = components_for(&[50.0, 10.0, 50.1, 10.1, 30.0], Tolerance::Window(0.1), 2);
        assert_eq!(out, vec![vec![0, 2], vec![1, 3], vec![4]]);
    }

    #[test]
    fn test_singletons() {
        let out = components_for(&[1.0, 2.0, 3.0], Tolerance::None, 2);
        assert_eq!(out, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_duplicates_with_exact_tolerance() {
        let out = components_for(&[5.0, 6.0, 5.0], Tolerance::None, 2);
        assert_eq!(out, vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn test_members_map_back_to_row_ids() {
        let schema = TableSchema::new(vec!["PrecMz".into()], vec![]);
        let rows = [1.0, f64::NAN, 1.1, 7.0]
            .iter()
            .map(|v| FeatureRow::new(vec![*v], vec![]))
            .collect();
        let table = FeatureTable::try_from_rows(schema.clone(), rows).unwrap();
        let mut tols = ToleranceMap::new();
        tols.insert("PrecMz".into(), Tolerance::Window(0.1));
        let dims = MatchDimensions::resolve(&schema, &["PrecMz".into()], &tols).unwrap();
        let built = build_hyperrectangles(&table, &dims).unwrap();
        let index = SpatialIndex::bulk_load(&built.rects, 2).unwrap();
        let out = connected_components(&built.rects, &index);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].members, vec![0, 2]);
        assert_eq!(out[1].members, vec![3]);
        assert_eq!(out[1].first(), 3);
    }
}
