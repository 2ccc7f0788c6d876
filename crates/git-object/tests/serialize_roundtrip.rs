use bstr::BString;
use git_hash::ObjectId;
use git_object::{Blob, Commit, FileMode, Object, RawObject, Signature, Tree, TreeEntry};
use proptest::prelude::*;

fn mode_strategy() -> impl Strategy<Value = FileMode> {
    prop_oneof![
        Just(FileMode::Regular),
        Just(FileMode::Executable),
        Just(FileMode::Symlink),
        Just(FileMode::Gitlink),
        Just(FileMode::Tree),
    ]
}

fn tree_strategy() -> impl Strategy<Value = Tree> {
    proptest::collection::btree_map("[a-zA-Z0-9._-]{1,12}", (mode_strategy(), any::<[u8; 20]>()), 0..16)
        .prop_map(|entries| Tree {
            entries: entries
                .into_iter()
                .map(|(name, (mode, oid))| TreeEntry::new(mode, name, ObjectId::new(oid)))
                .collect(),
        })
}

proptest! {
    #[test]
    fn blob_canonical_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let obj = Object::Blob(Blob::new(data));
        let parsed = Object::parse(&obj.serialize()).unwrap();
        prop_assert_eq!(parsed, obj);
    }

    #[test]
    fn tree_encoding_is_stable(tree in tree_strategy()) {
        let encoded = tree.serialize_content();
        let reparsed = Tree::parse(&encoded).unwrap();
        prop_assert_eq!(reparsed.serialize_content(), encoded);

        let mut shuffled = tree.clone();
        shuffled.entries.reverse();
        let a = Object::Tree(tree).compute_oid().unwrap();
        let b = Object::Tree(shuffled).compute_oid().unwrap();
        prop_assert_eq!(a, b);
    }
}

#[test]
fn commit_object_roundtrip() {
    let sig = Signature::new("A U Thor", "author@example.com", 1_700_000_000, -480);
    let commit = Commit::new(
        ObjectId::from_hex("4b825dc642cb6eb9a060e54bf8d69288fbee4904").unwrap(),
        vec![ObjectId::from_hex("b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0").unwrap()],
        sig.clone(),
        sig,
        "subject\n\nbody\n",
    );
    let obj = Object::Commit(commit);
    let raw = obj.to_raw();
    assert_eq!(raw.obj_type, obj.object_type());
    assert_eq!(raw.parse().unwrap(), obj);
    assert_eq!(raw.compute_oid().unwrap(), obj.compute_oid().unwrap());
    assert_eq!(RawObject::from_canonical(&obj.serialize()).unwrap(), raw);
}

#[test]
fn empty_tree_has_well_known_name() {
    let oid = Object::Tree(Tree::new()).compute_oid().unwrap();
    assert_eq!(oid.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
}

#[test]
fn entry_names_are_bytes() {
    let name = BString::from(&b"caf\xe9"[..]);
    let tree = Tree {
        entries: vec![TreeEntry::new(FileMode::Regular, name.clone(), ObjectId::NULL)],
    };
    let parsed = Tree::parse(&tree.serialize_content()).unwrap();
    assert_eq!(parsed.entries[0].name, name);
}
