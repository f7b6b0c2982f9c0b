//! Transform hierarchy properties on random forests

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::foundation::collections::NodeHandle;
use crate::foundation::math::{Mat4, Quat, Transform, Vec3};
use crate::scene::{AttachmentRule, SceneError, SceneHierarchy};

const SEEDS: [u64; 3] = [7, 1234, 98_765];

fn random_transform(rng: &mut StdRng, uniform_scale: bool) -> Transform {
    let position = Vec3::new(rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0), rng.gen_range(-5.0..5.0));
    let rotation = Quat::from_euler_angles(rng.gen_range(-3.0..3.0), rng.gen_range(-1.5..1.5), rng.gen_range(-3.0..3.0));
    let scale = if uniform_scale {
        Vec3::repeat(rng.gen_range(0.8..1.25))
    } else {
        Vec3::new(rng.gen_range(0.5..2.0), rng.gen_range(0.5..2.0), rng.gen_range(0.5..2.0))
    };
    Transform::from_parts(position, rotation, scale)
}

/// Build a random forest; each new node picks an earlier node or no parent
fn random_forest(rng: &mut StdRng, count: usize, uniform_scale: bool) -> (SceneHierarchy, Vec<NodeHandle>) {
    let mut hierarchy = SceneHierarchy::default();
    let mut nodes: Vec<NodeHandle> = Vec::with_capacity(count);

    for _ in 0..count {
        let node = hierarchy.create_node(random_transform(rng, uniform_scale), None);
        if !nodes.is_empty() && rng.gen_bool(0.75) {
            let parent = nodes[rng.gen_range(0..nodes.len())];
            hierarchy
                .set_parent_attachment(node, Some(parent), AttachmentRule::KeepRelative)
                .unwrap();
        }
        nodes.push(node);
    }
    (hierarchy, nodes)
}

/// World matrix from scratch: product of local matrices up the parent chain
fn composed_world(hierarchy: &SceneHierarchy, node: NodeHandle) -> Mat4 {
    let mut world = Mat4::identity();
    let mut current = Some(node);
    while let Some(handle) = current {
        let node = hierarchy.node(handle).unwrap();
        world = node.local_matrix() * world;
        current = node.parent();
    }
    world
}

fn assert_links_consistent(hierarchy: &SceneHierarchy, nodes: &[NodeHandle]) {
    for &handle in nodes {
        let node = hierarchy.node(handle).unwrap();
        if let Some(parent) = node.parent() {
            assert!(hierarchy.node(parent).unwrap().children().contains(&handle));
        }
        for &child in node.children() {
            assert_eq!(hierarchy.node(child).unwrap().parent(), Some(handle));
        }
        // Finite depth means no cycle
        assert!(hierarchy.depth(handle).unwrap() < nodes.len());
    }
}

#[test]
fn test_world_matrix_is_parent_world_times_local() {
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let (hierarchy, nodes) = random_forest(&mut rng, 40, false);

        for &handle in &nodes {
            let node = hierarchy.node(handle).unwrap();
            let expected = match node.parent() {
                Some(parent) => hierarchy.world_matrix(parent).unwrap() * node.local_matrix(),
                None => node.local_matrix(),
            };
            assert_relative_eq!(hierarchy.world_matrix(handle).unwrap(), expected, epsilon = 1e-3);
        }
    }
}

#[test]
fn test_cached_matrices_match_fresh_composition_after_edits() {
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let (mut hierarchy, nodes) = random_forest(&mut rng, 30, false);

        for _ in 0..50 {
            let target = nodes[rng.gen_range(0..nodes.len())];
            let edited = match rng.gen_range(0..3) {
                0 => hierarchy.set_relative_location(target, Vec3::new(rng.gen_range(-5.0..5.0), 0.0, 1.0)),
                1 => hierarchy.set_relative_rotation(target, Quat::from_euler_angles(0.0, rng.gen_range(-1.0..1.0), 0.3)),
                _ => hierarchy.set_relative_scale(target, Vec3::repeat(rng.gen_range(0.5..2.0))),
            };
            edited.unwrap();

            // Read only a few nodes between edits so stale caches linger
            for _ in 0..3 {
                let picked = nodes[rng.gen_range(0..nodes.len())];
                let _ = hierarchy.world_matrix(picked);
            }
        }

        for &handle in &nodes {
            let cached = hierarchy.world_matrix(handle).unwrap();
            assert_relative_eq!(cached, composed_world(&hierarchy, handle), epsilon = 1e-3);
            // Reading again changes nothing
            assert_eq!(hierarchy.world_matrix(handle).unwrap(), cached);
            assert!(!hierarchy.node(handle).unwrap().is_transform_dirty());

            let inverse = hierarchy.world_matrix_inverse(handle).unwrap();
            assert_relative_eq!(cached * inverse, Mat4::identity(), epsilon = 1e-3);
        }
    }
}

#[test]
fn test_random_reparenting_keeps_tree_and_world_transforms() {
    for seed in SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let (mut hierarchy, nodes) = random_forest(&mut rng, 25, true);

        for _ in 0..60 {
            let child = nodes[rng.gen_range(0..nodes.len())];
            let parent = rng.gen_bool(0.8).then(|| nodes[rng.gen_range(0..nodes.len())]);
            let would_cycle = parent.is_some_and(|p| p == child || hierarchy.is_descendant_of(p, child));

            let world_before = hierarchy.world_matrix(child).unwrap();
            let parents_before: Vec<_> = nodes.iter().map(|n| hierarchy.node(*n).unwrap().parent()).collect();

            let result = hierarchy.set_parent_attachment(child, parent, AttachmentRule::KeepWorld);

            if would_cycle {
                assert!(matches!(result, Err(SceneError::CyclicAttachment { .. })));
                let parents_after: Vec<_> = nodes.iter().map(|n| hierarchy.node(*n).unwrap().parent()).collect();
                assert_eq!(parents_after, parents_before);
            } else {
                result.unwrap();
                assert_eq!(hierarchy.node(child).unwrap().parent(), parent);
                assert_relative_eq!(
                    hierarchy.world_matrix(child).unwrap(),
                    world_before,
                    epsilon = 1e-2,
                    max_relative = 1e-3
                );
            }
            assert_links_consistent(&hierarchy, &nodes);
        }
    }
}

#[test]
fn test_destroying_inner_nodes_keeps_descendants_in_place() {
    let mut rng = StdRng::seed_from_u64(SEEDS[0]);
    let (mut hierarchy, mut nodes) = random_forest(&mut rng, 20, true);

    for _ in 0..8 {
        let victim = nodes.remove(rng.gen_range(0..nodes.len()));
        let worlds_before: Vec<Mat4> = nodes.iter().map(|n| hierarchy.world_matrix(*n).unwrap()).collect();

        hierarchy.destroy_node(victim).unwrap();

        assert!(!hierarchy.contains(victim));
        for (handle, before) in nodes.iter().zip(&worlds_before) {
            assert_relative_eq!(hierarchy.world_matrix(*handle).unwrap(), *before, epsilon = 1e-2, max_relative = 1e-3);
        }
        assert_links_consistent(&hierarchy, &nodes);
    }
}
