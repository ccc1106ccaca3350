//! Shape construction, typed access, and lookup behavior.

use std::sync::Arc;

use resultdoc::{
    DocumentOptions, FieldDef, Operation, OperationBuilder, ResultDocError, ResultDocument,
    SelectionSetId, TokenKind,
};

fn sample_operation() -> (Arc<Operation>, SelectionSetId) {
    let mut b = OperationBuilder::new();
    let user = b
        .selection_set(vec![FieldDef::new("id"), FieldDef::new("name").nullable()])
        .expect("user set");
    let root = b
        .selection_set(vec![
            FieldDef::new("user").composite().nullable(),
            FieldDef::new("tags").list().nullable(),
            FieldDef::new("count"),
            FieldDef::new("secret").internal(),
            FieldDef::new("promo").included_when(0b1),
        ])
        .expect("root set");
    (Arc::new(b.build(root).expect("operation")), user)
}

fn new_doc(include_flags: u64) -> (ResultDocument, SelectionSetId) {
    let (op, user) = sample_operation();
    let doc = ResultDocument::new(op, include_flags, DocumentOptions::default()).expect("document");
    (doc, user)
}

#[test]
fn root_is_shaped_from_the_root_selection_set() {
    let (doc, _) = new_doc(0b1);
    let root = doc.data();
    assert_eq!(root.kind().unwrap(), TokenKind::StartObject);
    assert_eq!(root.len().unwrap(), 5);
    assert!(root.parent().unwrap().is_none());
    // Every slot starts as an unassigned placeholder.
    assert!(root
        .get_property("count")
        .unwrap()
        .is_null_or_invalidated()
        .unwrap());
}

#[test]
fn property_lookup_hits_and_misses() {
    let (doc, _) = new_doc(0b1);
    let root = doc.data();
    assert!(root.try_get_property("tags").unwrap().is_some());
    assert!(root.try_get_property("nope").unwrap().is_none());
    assert!(matches!(
        root.get_property("nope").unwrap_err(),
        ResultDocError::KeyNotFound(_)
    ));
}

#[test]
fn scalar_assignment_and_typed_readback() {
    let (doc, _) = new_doc(0b1);
    let root = doc.data();
    let count = root.get_property("count").unwrap();
    count.set_number(b"42").unwrap();
    assert_eq!(count.i32_value().unwrap(), 42);
    assert_eq!(count.i64_value().unwrap(), 42);
    assert_eq!(count.f64_value().unwrap(), 42.0);
    assert!(matches!(
        count.bool_value().unwrap_err(),
        ResultDocError::WrongTokenKind { .. }
    ));

    let promo = root.get_property("promo").unwrap();
    promo.set_bool(true).unwrap();
    assert_eq!(promo.bool_value().unwrap(), true);

    let secret = root.get_property("secret").unwrap();
    assert!(secret.is_internal().unwrap());
    secret.set_null().unwrap();
    assert!(secret.is_null_or_invalidated().unwrap());
}

#[test]
fn string_values_roundtrip_through_escaping() {
    let (doc, _) = new_doc(0b1);
    let original = "line\nbreak \"quoted\" tab\t";
    let mut escaped = Vec::new();
    let is_encoded = resultdoc::text::escape_into(original, &mut escaped);
    assert!(is_encoded);
    let slot = doc.data().get_property("count").unwrap();
    slot.set_string(&escaped, is_encoded).unwrap();
    assert_eq!(slot.string_value().unwrap(), original);

    let plain = doc.data().get_property("promo").unwrap();
    plain.set_string(b"plain", false).unwrap();
    assert_eq!(plain.string_value().unwrap(), "plain");
    assert!(plain.try_bool().is_err());
}

#[test]
fn selection_metadata_reaches_value_slots() {
    let (doc, user_set) = new_doc(0b1);
    let root = doc.data();
    // Lookup returns the value slot; its flags live on the name row.
    assert!(root.get_property("secret").unwrap().is_internal().unwrap());
    assert!(root.get_property("user").unwrap().is_nullable().unwrap());
    assert!(!root.get_property("count").unwrap().is_nullable().unwrap());
    assert!(!root.get_property("count").unwrap().is_internal().unwrap());
    let sel = root
        .get_property("tags")
        .unwrap()
        .selection()
        .unwrap()
        .expect("tags is selection-shaped");
    assert_eq!(&**sel.response_key(), "tags");
    assert!(sel.is_list());

    // The same holds one level down.
    let user = root.get_property("user").unwrap().set_new_object(user_set).unwrap();
    assert!(user.get_property("name").unwrap().is_nullable().unwrap());
    assert!(!user.get_property("id").unwrap().is_nullable().unwrap());
}

#[test]
fn numbers_reject_trailing_garbage() {
    let (doc, _) = new_doc(0b1);
    let count = doc.data().get_property("count").unwrap();
    count.set_number(b"12xy").unwrap();
    assert!(matches!(
        count.i32_value().unwrap_err(),
        ResultDocError::Format(_)
    ));
}

#[test]
fn nested_object_uses_selection_metadata() {
    let (doc, user_set) = new_doc(0b1);
    let user = doc.data().get_property("user").unwrap();
    let obj = user.set_new_object(user_set).unwrap();
    assert_eq!(obj.len().unwrap(), 2);
    obj.get_property("id").unwrap().set_number(b"7").unwrap();
    // The slot resolves through the reference to the same object.
    assert_eq!(
        user.get_property("id").unwrap().i64_value().unwrap(),
        7
    );
    assert_eq!(user.kind().unwrap(), TokenKind::StartObject);
}

#[test]
fn untyped_objects_take_assigned_names() {
    let (doc, _) = new_doc(0b1);
    let slot = doc.data().get_property("user").unwrap();
    let obj = doc.create_untyped_object(slot, 2).unwrap();
    slot.set_object_or_array(obj).unwrap();

    let mut escaped = Vec::new();
    let encoded = resultdoc::text::escape_into("we\"ird", &mut escaped);
    doc.assign_property_name(obj.cursor().next(), &escaped, encoded)
        .unwrap();
    assert_eq!(obj.len().unwrap(), 2);
    let value = obj.get_property("we\"ird").unwrap();
    value.set_bool(false).unwrap();
    assert_eq!(value.bool_value().unwrap(), false);
    // The second property is still unnamed and unfindable.
    assert!(obj.try_get_property("other").unwrap().is_none());
}

#[test]
fn arrays_check_bounds() {
    let (doc, _) = new_doc(0b1);
    let tags = doc.data().get_property("tags").unwrap();
    let arr = tags.set_new_array(3).unwrap();
    assert_eq!(arr.len().unwrap(), 3);
    arr.item(0).unwrap().set_string(b"a", false).unwrap();
    assert!(matches!(
        arr.item(3).unwrap_err(),
        ResultDocError::IndexOutOfRange { index: 3, len: 3 }
    ));
    assert_eq!(arr.items().unwrap().count(), 3);
}

#[test]
fn excluded_properties_are_skipped_by_iteration() {
    let (doc, _) = new_doc(0);
    let keys: Vec<String> = doc
        .data()
        .properties()
        .unwrap()
        .map(|p| p.unwrap().0.to_string())
        .collect();
    // "promo" requires bit 0; the mask is empty so it is excluded.
    assert_eq!(keys, ["user", "tags", "count", "secret"]);
}

#[test]
fn invalidation_is_object_local() {
    let (doc, user_set) = new_doc(0b1);
    let root = doc.data();
    let user = root.get_property("user").unwrap().set_new_object(user_set).unwrap();
    root.get_property("count").unwrap().set_number(b"1").unwrap();
    user.invalidate().unwrap();
    assert!(user.is_invalidated().unwrap());
    assert!(user.is_null_or_invalidated().unwrap());
    // Siblings and the root are untouched.
    assert!(!root.is_invalidated().unwrap());
    assert_eq!(root.get_property("count").unwrap().i32_value().unwrap(), 1);
}

#[test]
fn invalidating_scalars_is_a_no_op() {
    let (doc, _) = new_doc(0b1);
    let count = doc.data().get_property("count").unwrap();
    count.set_number(b"5").unwrap();
    count.invalidate().unwrap();
    assert_eq!(count.i32_value().unwrap(), 5);
}

#[test]
fn dispose_fails_later_operations() {
    let (doc, _) = new_doc(0b1);
    doc.dispose();
    doc.dispose();
    assert!(matches!(
        doc.data().get_property("count").unwrap_err(),
        ResultDocError::Disposed
    ));
    assert!(matches!(
        doc.data().path().unwrap_err(),
        ResultDocError::Disposed
    ));
}
