//! End-to-end checks: build a graph, search it, compare against brute force.

use prox::eval::{evaluate, generate_uniform};
use prox::{build_index, IndexSearch, VectorSet, VectorStore};

#[test]
fn unit_square_links_and_search() {
    // Four corners of the unit square. With two near links per vector each
    // corner keeps its orthogonal neighbors; the diagonals survive only as
    // longer links where the build recorded them.
    let set = VectorSet::from_flat(
        "square",
        2,
        vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
    )
    .unwrap();
    let index = build_index(&set, 2).unwrap();

    let links = index.links(0);
    assert_eq!(links[0].dist2, 1.0);
    assert_eq!(links[1].dist2, 1.0);
    let mut near: Vec<u32> = links[..2].iter().map(|l| l.target).collect();
    near.sort_unstable();
    assert_eq!(near, vec![1, 2]);

    let mut search = IndexSearch::new(&index, &set, 1, false).unwrap();
    let result = search.search(&[0.1, 0.1]).unwrap();
    let nearest = result.nearest().unwrap();
    assert_eq!(nearest.id, 0);
    assert!((nearest.dist2 - 0.02).abs() < 1e-6);
}

#[test]
fn duplicates_are_separated_and_merged_back() {
    // Vectors 3 and 7 are identical; exactly one of them survives as a graph
    // node, the other gets a single zero-length link to it.
    let set = VectorSet::from_flat(
        "dups",
        1,
        vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 3.0],
    )
    .unwrap();
    let index = build_index(&set, 2).unwrap();

    let dup = if index.is_dup(3) { 3 } else { 7 };
    let real = if dup == 3 { 7 } else { 3 };
    assert!(index.is_dup(dup));
    assert!(!index.is_dup(real));
    let dup_links = index.links(dup);
    assert_eq!(dup_links.len(), 1);
    assert_eq!(dup_links[0].target, real);
    assert_eq!(dup_links[0].dist2, 0.0);
    // The real vector's record leads with the zero-length duplicate link.
    assert_eq!(index.links(real)[0].target, dup);
    assert_eq!(index.links(real)[0].dist2, 0.0);

    // With duplicate merging on, a query at the shared position returns both.
    let mut search = IndexSearch::new(&index, &set, 2, true).unwrap();
    let result = search.search(&[3.0]).unwrap();
    let mut ids: Vec<u32> = result.neighbors.iter().map(|n| n.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![3, 7]);
    assert!(result.neighbors.iter().all(|n| n.dist2 == 0.0));

    // With merging off, only one of the pair comes back.
    let mut search = IndexSearch::new(&index, &set, 2, false).unwrap();
    let result = search.search(&[3.0]).unwrap();
    let hits: Vec<u32> = result
        .neighbors
        .iter()
        .filter(|n| n.dist2 == 0.0)
        .map(|n| n.id)
        .collect();
    assert_eq!(hits.len(), 1);
}

#[test]
fn indexed_vector_query_hits_the_bullseye() {
    let data = generate_uniform("bull", 120, 5, 9).unwrap();
    let index = build_index(&data, 6).unwrap();

    let target = 57u32;
    let mut search = IndexSearch::new(&index, &data, 4, false).unwrap();
    let result = search.search(data.vector(target)).unwrap();

    let nearest = result.nearest().unwrap();
    assert_eq!(nearest.id, target);
    assert_eq!(nearest.dist2, 0.0);
    // Distances are exact whether they came from a calc or were copied off
    // the node's link array, and the result is sorted.
    let mut prev = 0.0f32;
    for neighbor in &result.neighbors {
        assert!(neighbor.dist2 >= prev);
        prev = neighbor.dist2;
        let actual = prox::vecmath::distance2(data.vector(target), data.vector(neighbor.id));
        assert_eq!(neighbor.dist2, actual);
    }
}

#[test]
fn every_link_is_symmetric() {
    let data = generate_uniform("sym", 180, 6, 21).unwrap();
    let index = build_index(&data, 5).unwrap();

    for v in 0..index.len() as u32 {
        for link in index.links(v) {
            let reverse = index
                .links(link.target)
                .iter()
                .find(|l| l.target == v)
                .unwrap_or_else(|| panic!("link {v} -> {} has no reverse", link.target));
            assert_eq!(reverse.dist2, link.dist2);
        }
    }
}

#[test]
fn recall_against_brute_force() {
    let data = generate_uniform("recall", 200, 8, 5).unwrap();
    let index = build_index(&data, 20).unwrap();
    let queries = generate_uniform("recall-queries", 50, 8, 6).unwrap();

    let report = evaluate(&index, &data, &queries, 10).unwrap();
    assert_eq!(report.n_queries, 50);
    assert!(
        report.nearest_match_rate >= 0.95,
        "nearest match rate {} too low",
        report.nearest_match_rate
    );
    assert!(
        report.recall_at_k >= 0.85,
        "recall {} too low",
        report.recall_at_k
    );
    // The graph search must beat scanning everything.
    assert!(report.avg_index_calcs < report.avg_brute_calcs);
}

#[test]
fn rebuilds_are_deterministic() {
    let data = generate_uniform("det", 150, 4, 33).unwrap();
    let first = build_index(&data, 8).unwrap();
    let second = build_index(&data, 8).unwrap();

    assert_eq!(first.len(), second.len());
    for v in 0..first.len() as u32 {
        assert_eq!(first.links(v), second.links(v), "links differ for {v}");
    }
}
