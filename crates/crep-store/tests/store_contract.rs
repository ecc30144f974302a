//! Both backends must honor the same store contract.

use chrono::Utc;
use serde_json::json;

use crep_index::create_index;
use crep_store::{
    CausalRepoBranch, CausalRepoCommit, CausalRepoObject, CausalRepoStore, FileCausalRepoStore,
    MemoryCausalRepoStore,
};
use crep_types::{AtomId, ObjectId, SiteId};
use crep_weave::Atom;

fn exercise(store: &dyn CausalRepoStore) {
    let root = Atom::new(
        AtomId::new(SiteId::new("a").unwrap(), 1, 0),
        None,
        json!("root"),
    )
    .unwrap();
    let child = Atom::new(
        AtomId::new(SiteId::new("b").unwrap(), 2, 0),
        Some(root.id.clone()),
        json!("child"),
    )
    .unwrap();
    let index = create_index([&root, &child]);
    let commit = CausalRepoCommit::new("initial", Utc::now(), index.hash, None).unwrap();

    let objects = vec![
        CausalRepoObject::atom(root.clone()),
        CausalRepoObject::atom(child.clone()),
        CausalRepoObject::index(index.clone()),
        CausalRepoObject::Commit(commit.clone()),
    ];
    store.store_objects(&objects).unwrap();
    store.store_objects(&objects).unwrap();

    let missing = ObjectId::from_bytes(b"nope");
    let found = store
        .get_objects(&[index.hash, missing, commit.hash])
        .unwrap();
    assert_eq!(found.len(), 3);
    assert_eq!(found[0].as_ref().and_then(|o| o.as_index()), Some(&index));
    assert!(found[1].is_none());
    assert_eq!(store.get_object(&commit.hash).unwrap(), Some(CausalRepoObject::Commit(commit.clone())));

    for name in ["b", "a/2", "a/1", "c"] {
        store
            .save_branch(&CausalRepoBranch::new(name, commit.hash, Utc::now()))
            .unwrap();
    }
    let names = |prefix: &str| -> Vec<String> {
        store
            .get_branches(prefix)
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect()
    };
    assert_eq!(names(""), ["a/1", "a/2", "b", "c"]);
    assert_eq!(names("a/"), ["a/1", "a/2"]);

    let updated = CausalRepoBranch::new("b", index.hash, Utc::now());
    store.save_branch(&updated).unwrap();
    assert_eq!(store.get_branch("b").unwrap().map(|b| b.hash), Some(index.hash));
    assert_eq!(names("").len(), 4);

    store.delete_branch(&updated).unwrap();
    assert_eq!(names(""), ["a/1", "a/2", "c"]);
}

#[test]
fn memory_store_contract() {
    exercise(&MemoryCausalRepoStore::new());
}

#[test]
fn file_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    exercise(&FileCausalRepoStore::open(dir.path()).unwrap());
}
