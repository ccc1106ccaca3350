//! Parent chains and path construction.

use std::sync::Arc;

use resultdoc::{
    DocumentOptions, FieldDef, Operation, OperationBuilder, PathSegment, ResultDocError,
    ResultDocument, SelectionSetId,
};

fn nested_operation() -> (Arc<Operation>, SelectionSetId, SelectionSetId) {
    let mut b = OperationBuilder::new();
    let address = b
        .selection_set(vec![FieldDef::new("city")])
        .expect("address set");
    let user = b
        .selection_set(vec![
            FieldDef::new("id"),
            FieldDef::new("address").composite(),
            FieldDef::new("emails").list(),
        ])
        .expect("user set");
    let root = b
        .selection_set(vec![FieldDef::new("user").composite(), FieldDef::new("items").list()])
        .expect("root set");
    (Arc::new(b.build(root).expect("operation")), user, address)
}

fn new_doc() -> (ResultDocument, SelectionSetId, SelectionSetId) {
    let (op, user, address) = nested_operation();
    let doc = ResultDocument::new(op, 0, DocumentOptions::default()).expect("document");
    (doc, user, address)
}

#[test]
fn root_path_is_empty() {
    let (doc, _, _) = new_doc();
    let path = doc.data().path().unwrap();
    assert!(path.is_empty());
    assert_eq!(path.to_string(), "/");
}

#[test]
fn object_paths_use_response_keys() {
    let (doc, user_set, address_set) = new_doc();
    let user = doc
        .data()
        .get_property("user")
        .unwrap()
        .set_new_object(user_set)
        .unwrap();
    let address = user
        .get_property("address")
        .unwrap()
        .set_new_object(address_set)
        .unwrap();
    let city = address.get_property("city").unwrap();
    city.set_string(b"Oslo", false).unwrap();

    assert_eq!(city.path().unwrap().to_string(), "/user/address/city");
    assert_eq!(address.path().unwrap().to_string(), "/user/address");
    assert_eq!(user.path().unwrap().to_string(), "/user");
}

#[test]
fn array_paths_use_indices() {
    let (doc, user_set, _) = new_doc();
    let items = doc
        .data()
        .get_property("items")
        .unwrap()
        .set_new_array(3)
        .unwrap();
    let second = items.item(1).unwrap();
    let obj = second.set_new_object(user_set).unwrap();
    let id = obj.get_property("id").unwrap();

    let path = id.path().unwrap();
    assert_eq!(path.to_string(), "/items/1/id");
    assert_eq!(
        path.segments()[1],
        PathSegment::Index(1),
        "array hop carries the element index"
    );
}

#[test]
fn parents_climb_to_the_root() {
    let (doc, user_set, address_set) = new_doc();
    let user = doc
        .data()
        .get_property("user")
        .unwrap()
        .set_new_object(user_set)
        .unwrap();
    let address = user
        .get_property("address")
        .unwrap()
        .set_new_object(address_set)
        .unwrap();
    let city = address.get_property("city").unwrap();

    let p1 = city.parent().unwrap().expect("city has a parent");
    assert_eq!(p1.cursor(), address.cursor());
    let p2 = p1.parent().unwrap().expect("address has a parent");
    assert_eq!(p2.cursor(), user.cursor());
    let p3 = p2.parent().unwrap().expect("user has a parent");
    assert_eq!(p3.cursor(), doc.data().cursor());
    assert!(p3.parent().unwrap().is_none());
}

#[test]
fn array_slot_parent_is_the_array() {
    let (doc, _, _) = new_doc();
    let items = doc
        .data()
        .get_property("items")
        .unwrap()
        .set_new_array(2)
        .unwrap();
    let slot = items.item(0).unwrap();
    let parent = slot.parent().unwrap().expect("slot has a parent");
    assert_eq!(parent.cursor(), items.cursor());
}

#[test]
fn runaway_nesting_fails_with_path_too_deep() {
    let (doc, _, _) = new_doc();
    let mut slot = doc.data().get_property("items").unwrap();
    // Each level adds two parent hops (array start plus linking slot), so
    // forty levels sails past the walk bound.
    for _ in 0..40 {
        let arr = slot.set_new_array(1).unwrap();
        slot = arr.item(0).unwrap();
    }
    assert!(matches!(
        slot.path().unwrap_err(),
        ResultDocError::PathTooDeep(_)
    ));
    // Shallow elements still resolve fine.
    assert_eq!(
        doc.data().get_property("user").unwrap().path().unwrap().to_string(),
        "/user"
    );
}

#[test]
fn paths_survive_escaped_property_names() {
    let (doc, _, _) = new_doc();
    let slot = doc.data().get_property("user").unwrap();
    let obj = doc.create_untyped_object(slot, 1).unwrap();
    slot.set_object_or_array(obj).unwrap();
    let mut escaped = Vec::new();
    let encoded = resultdoc::text::escape_into("a\tb", &mut escaped);
    doc.assign_property_name(obj.cursor().next(), &escaped, encoded)
        .unwrap();
    let value = obj.get_property("a\tb").unwrap();
    value.set_null().unwrap();
    let path = value.path().unwrap();
    assert_eq!(path.segments().len(), 2);
    assert_eq!(path.segments()[1], PathSegment::Key(Arc::from("a\tb")));
}
