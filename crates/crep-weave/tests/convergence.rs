use std::collections::BTreeSet;

use proptest::prelude::*;
use serde_json::json;

use crep_types::{AtomId, SiteId};
use crep_weave::{Atom, Weave};

const SITES: [&str; 3] = ["a", "b", "c"];

/// Build a random causal tree in causal order. Atom `i` gets timestamp
/// `i + 1` and a parent drawn from the atoms before it, so every
/// timestamp is unique and always greater than its cause's.
fn causal_tree() -> impl Strategy<Value = Vec<Atom>> {
    prop::collection::vec((any::<prop::sample::Index>(), 0usize..3, 0u32..2), 0..16).prop_map(
        |specs| {
            let root_id = AtomId::new(SiteId::new("a").unwrap(), 1, 0);
            let mut atoms = vec![Atom::new(root_id, None, json!("root")).unwrap()];
            for (i, (parent, site, priority)) in specs.into_iter().enumerate() {
                let cause = atoms[parent.index(atoms.len())].id.clone();
                let id = AtomId::new(SiteId::new(SITES[site]).unwrap(), i as u64 + 2, priority);
                atoms.push(Atom::new(id, Some(cause), json!(i)).unwrap());
            }
            atoms
        },
    )
}

fn shuffled_tree() -> impl Strategy<Value = (Vec<Atom>, Vec<Atom>)> {
    causal_tree().prop_flat_map(|atoms| {
        let shuffled = Just(atoms.clone()).prop_shuffle();
        (Just(atoms), shuffled)
    })
}

fn keys(weave: &Weave) -> Vec<String> {
    weave.iter().map(|a| a.id.key()).collect()
}

fn is_ancestor(atoms: &[Atom], ancestor: &AtomId, atom: &Atom) -> bool {
    let mut cause = atom.cause.clone();
    while let Some(id) = cause {
        if &id == ancestor {
            return true;
        }
        cause = atoms.iter().find(|a| a.id == id).and_then(|a| a.cause.clone());
    }
    false
}

proptest! {
    #[test]
    fn delivery_order_does_not_change_the_weave((causal, shuffled) in shuffled_tree()) {
        let mut reference = Weave::new();
        let result = reference.insert_many(causal.clone());
        prop_assert!(result.is_complete());
        prop_assert!(reference.is_valid());

        let mut replica = Weave::new();
        let result = replica.import_all(shuffled);
        prop_assert!(result.is_complete());
        prop_assert_eq!(result.added.len(), causal.len());
        prop_assert!(replica.is_valid());
        prop_assert_eq!(keys(&replica), keys(&reference));
    }

    #[test]
    fn descendants_are_exactly_the_subtree(atoms in causal_tree(), pick in any::<prop::sample::Index>()) {
        let mut weave = Weave::new();
        prop_assert!(weave.insert_many(atoms.clone()).is_complete());

        let parent = &atoms[pick.index(atoms.len())];
        let found: BTreeSet<String> = weave
            .descendants(&parent.id)
            .map(|a| a.id.key())
            .collect();
        let expected: BTreeSet<String> = atoms
            .iter()
            .filter(|a| is_ancestor(&atoms, &parent.id, a))
            .map(|a| a.id.key())
            .collect();
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn subweave_is_chain_plus_subtree(atoms in causal_tree(), pick in any::<prop::sample::Index>()) {
        let mut weave = Weave::new();
        prop_assert!(weave.insert_many(atoms.clone()).is_complete());

        let parent = &atoms[pick.index(atoms.len())];
        let sub = weave.subweave(std::slice::from_ref(&parent.id)).unwrap();
        prop_assert!(sub.is_valid());

        let mut fresh = Weave::new();
        prop_assert!(fresh.insert_many(sub.atoms()).is_complete());

        let chain: BTreeSet<String> = weave
            .reference_chain(&parent.id)
            .unwrap()
            .into_iter()
            .chain(weave.descendants(&parent.id))
            .map(|a| a.id.key())
            .collect();
        let contents: BTreeSet<String> = sub.iter().map(|a| a.id.key()).collect();
        prop_assert_eq!(contents, chain);
    }
}
