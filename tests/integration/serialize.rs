//! Single-pass JSON serialization.

use std::sync::Arc;

use resultdoc::{
    DocumentOptions, FieldDef, Operation, OperationBuilder, ResultDocument, SelectionSetId,
};

fn operation() -> (Arc<Operation>, SelectionSetId) {
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
    let (op, user) = operation();
    (
        ResultDocument::new(op, include_flags, DocumentOptions::default()).unwrap(),
        user,
    )
}

fn json(doc: &ResultDocument) -> String {
    String::from_utf8(doc.to_json_bytes().unwrap()).unwrap()
}

#[test]
fn unassigned_slots_serialize_as_null() {
    let (doc, _) = new_doc(0b1);
    assert_eq!(
        json(&doc),
        r#"{"user":null,"tags":null,"count":null,"promo":null}"#
    );
}

#[test]
fn internal_and_excluded_properties_are_skipped() {
    let (doc, _) = new_doc(0);
    // "secret" is internal, "promo" needs bit 0 of the mask.
    assert_eq!(json(&doc), r#"{"user":null,"tags":null,"count":null}"#);
}

#[test]
fn assignment_order_does_not_change_the_output() {
    let (first, user_set) = new_doc(0b1);
    first
        .data()
        .get_property("count")
        .unwrap()
        .set_number(b"3")
        .unwrap();
    let obj = first
        .data()
        .get_property("user")
        .unwrap()
        .set_new_object(user_set)
        .unwrap();
    obj.get_property("id").unwrap().set_number(b"1").unwrap();
    obj.get_property("name").unwrap().set_string(b"ada", false).unwrap();

    let (second, user_set) = new_doc(0b1);
    let obj = second
        .data()
        .get_property("user")
        .unwrap()
        .set_new_object(user_set)
        .unwrap();
    obj.get_property("name").unwrap().set_string(b"ada", false).unwrap();
    obj.get_property("id").unwrap().set_number(b"1").unwrap();
    second
        .data()
        .get_property("count")
        .unwrap()
        .set_number(b"3")
        .unwrap();

    assert_eq!(json(&first), json(&second));
    assert_eq!(
        json(&first),
        r#"{"user":{"id":1,"name":"ada"},"tags":null,"count":3,"promo":null}"#
    );
}

#[test]
fn arrays_of_placeholders_serialize_as_nulls() {
    let (doc, _) = new_doc(0b1);
    doc.data()
        .get_property("tags")
        .unwrap()
        .set_new_array(3)
        .unwrap();
    assert_eq!(
        json(&doc),
        r#"{"user":null,"tags":[null,null,null],"count":null,"promo":null}"#
    );
}

#[test]
fn invalidated_objects_serialize_as_null() {
    let (doc, user_set) = new_doc(0b1);
    let obj = doc
        .data()
        .get_property("user")
        .unwrap()
        .set_new_object(user_set)
        .unwrap();
    obj.get_property("id").unwrap().set_number(b"9").unwrap();
    doc.data()
        .get_property("count")
        .unwrap()
        .set_number(b"2")
        .unwrap();
    obj.invalidate().unwrap();
    assert_eq!(
        json(&doc),
        r#"{"user":null,"tags":null,"count":2,"promo":null}"#
    );
}

#[test]
fn stored_escapes_are_emitted_verbatim() {
    let (doc, _) = new_doc(0b1);
    let original = "a\"b\nc";
    let mut escaped = Vec::new();
    let encoded = resultdoc::text::escape_into(original, &mut escaped);
    doc.data()
        .get_property("count")
        .unwrap()
        .set_string(&escaped, encoded)
        .unwrap();
    assert_eq!(
        json(&doc),
        "{\"user\":null,\"tags\":null,\"count\":\"a\\\"b\\nc\",\"promo\":null}"
    );
}

#[test]
fn creation_order_of_linked_runs_does_not_matter() {
    // Same logical tree, but the second document creates the child runs in
    // the opposite order before linking them.
    let (a, user_set) = new_doc(0b1);
    let arr = a
        .data()
        .get_property("tags")
        .unwrap()
        .set_new_array(2)
        .unwrap();
    for i in 0..2 {
        let obj = arr.item(i).unwrap().set_new_object(user_set).unwrap();
        obj.get_property("id")
            .unwrap()
            .set_number(i.to_string().as_bytes())
            .unwrap();
    }

    let (b, user_set) = new_doc(0b1);
    let arr = b
        .data()
        .get_property("tags")
        .unwrap()
        .set_new_array(2)
        .unwrap();
    for i in (0..2).rev() {
        let slot = arr.item(i).unwrap();
        let obj = b.create_object(slot, user_set).unwrap();
        slot.set_object_or_array(obj).unwrap();
        obj.get_property("id")
            .unwrap()
            .set_number(i.to_string().as_bytes())
            .unwrap();
    }

    assert_eq!(json(&a), json(&b));
}

#[test]
fn untyped_object_names_are_emitted_from_payload() {
    let (doc, _) = new_doc(0b1);
    let slot = doc.data().get_property("user").unwrap();
    let obj = doc.create_untyped_object(slot, 2).unwrap();
    slot.set_object_or_array(obj).unwrap();
    let mut escaped = Vec::new();
    let encoded = resultdoc::text::escape_into("we\"ird", &mut escaped);
    doc.assign_property_name(obj.cursor().next(), &escaped, encoded)
        .unwrap();
    obj.get_property("we\"ird")
        .unwrap()
        .set_bool(true)
        .unwrap();
    // The second property was never named and is skipped entirely.
    assert_eq!(
        json(&doc),
        "{\"user\":{\"we\\\"ird\":true},\"tags\":null,\"count\":null,\"promo\":null}"
    );
}

#[test]
fn subtrees_serialize_directly_from_their_element() {
    let (doc, user_set) = new_doc(0b1);
    let user = doc
        .data()
        .get_property("user")
        .unwrap()
        .set_new_object(user_set)
        .unwrap();
    user.get_property("id").unwrap().set_number(b"5").unwrap();
    user.get_property("name")
        .unwrap()
        .set_string(b"bo", false)
        .unwrap();
    let arr = doc
        .data()
        .get_property("tags")
        .unwrap()
        .set_new_array(2)
        .unwrap();
    arr.item(0).unwrap().set_bool(true).unwrap();

    // Whole branches, through the slot and through the linked run alike.
    let expected = br#"{"id":5,"name":"bo"}"#.to_vec();
    assert_eq!(user.to_json_bytes().unwrap(), expected);
    assert_eq!(
        doc.data().get_property("user").unwrap().to_json_bytes().unwrap(),
        expected
    );
    assert_eq!(arr.to_json_bytes().unwrap(), b"[true,null]".to_vec());
    // Leaves too.
    assert_eq!(
        user.get_property("id").unwrap().to_json_bytes().unwrap(),
        b"5".to_vec()
    );
    // The subtree fragment matches what the full document emits.
    let full = String::from_utf8(doc.to_json_bytes().unwrap()).unwrap();
    assert!(full.contains(r#""user":{"id":5,"name":"bo"}"#));
}

#[test]
fn custom_writer_receives_scalars_as_single_fragments() {
    use resultdoc::ValueWriter;

    #[derive(Default)]
    struct Counting {
        raw_calls: usize,
        nulls: usize,
        depth: usize,
    }

    impl ValueWriter for Counting {
        fn begin_object(&mut self) {
            self.depth += 1;
        }
        fn end_object(&mut self) {
            self.depth -= 1;
        }
        fn begin_array(&mut self) {
            self.depth += 1;
        }
        fn end_array(&mut self) {
            self.depth -= 1;
        }
        fn property_name(&mut self, _key: &str) {}
        fn raw_property_name(&mut self, _quoted: &[u8]) {}
        fn string_value(&mut self, _value: &str) {}
        fn bool_value(&mut self, _value: bool) {}
        fn null_value(&mut self) {
            self.nulls += 1;
        }
        fn raw(&mut self, fragment: &[u8]) {
            assert!(!fragment.is_empty());
            self.raw_calls += 1;
        }
    }

    let (doc, _) = new_doc(0b1);
    doc.data()
        .get_property("count")
        .unwrap()
        .set_number(b"17")
        .unwrap();
    doc.data()
        .get_property("promo")
        .unwrap()
        .set_string(b"x", false)
        .unwrap();
    let mut sink = Counting::default();
    doc.write_to(&mut sink).unwrap();
    assert_eq!(sink.raw_calls, 2, "one raw call per assigned scalar");
    assert_eq!(sink.nulls, 2, "user and tags are unassigned");
    assert_eq!(sink.depth, 0);
}
