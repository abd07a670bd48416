use dom_blend::{
	blend,
	component::{on_resolved, Attach},
	host::HostExt,
	memory::Node,
	vnode::VNodeState,
	vnode_of, BlendOptions, Callback, HostObject, HostRef, Value,
};
use std::{cell::Cell, rc::Rc};

use renderer_::{append, count_warnings, insert_before, remove, Renderer};

/// `<body><form id="signup"><input name="phone" placeholder="Phone"></form></body>`
fn signup_page() -> (Rc<Node>, Rc<Node>) {
	let page = Node::new_document();
	let form = page.create_element("form");
	form.set_attribute("id", "signup");
	let phone = page.create_element("input");
	phone.set_attribute("name", "phone");
	phone.set_attribute("placeholder", "Phone");
	form.append_child(&phone).unwrap();
	page.body().unwrap().append_child(&form).unwrap();
	(page, phone)
}

#[test]
fn phone_input_merges_and_restores() {
	let (page, phone) = signup_page();
	let inputs = Rc::new(Cell::new(0));
	let listener = Callback::new({
		let inputs = inputs.clone();
		move |_| {
			inputs.set(inputs.get() + 1);
			Ok(Value::Undefined)
		}
	});

	let ((), warnings) = count_warnings(|| {
		let renderer = Renderer::new(&page.body().unwrap());
		let input = renderer.element("input", &[("name", "phone"), ("placeholder", "+1 555 0100")]);
		input.call("addEventListener", &["input".into(), listener.clone().into()]).unwrap();
		append(&renderer.root, &input);

		assert_eq!(phone.get_attribute("placeholder").as_deref(), Some("+1 555 0100"));
		assert_eq!(phone.listener_count("input"), 1);
		phone.dispatch_event("input");
		assert_eq!(inputs.get(), 1);
		assert_eq!(page.query_selector_all("input").unwrap().len(), 1);

		remove(&renderer.root, &input);
		assert_eq!(phone.get_attribute("placeholder").as_deref(), Some("Phone"));
		assert_eq!(phone.listener_count("input"), 0);
		assert_eq!(vnode_of(&Value::Object(input)).unwrap().state(), VNodeState::Detached);
	});
	assert_eq!(warnings, 0);
}

#[test]
fn label_style_is_restored() {
	let page = Node::new_document();
	let label = page.create_element("label");
	label.set_attribute("for", "agreement");
	label.style().set_property("color", "blue", "");
	page.body().unwrap().append_child(&label).unwrap();

	let renderer = Renderer::new(&page.body().unwrap());
	let generated = renderer.element("label", &[("for", "agreement")]);
	let style = generated.style().unwrap();
	style.set("color", "red".into()).unwrap();
	style.call("setProperty", &["font-weight".into(), "bold".into(), "important".into()]).unwrap();
	append(&renderer.root, &generated);

	assert_eq!(label.style().css_text(), "color: red; font-weight: bold !important;");

	style.set("color", "green".into()).unwrap();
	assert_eq!(label.style().get_property_value("color"), "green");

	remove(&renderer.root, &generated);
	assert_eq!(label.style().css_text(), "color: blue;");
}

#[test]
fn unmatched_mandatory_selector_stays_pending() {
	let page = Node::new_document();
	let body = page.body().unwrap();

	let (quote, warnings) = count_warnings(|| {
		let renderer = Renderer::new(&body);
		let quote = renderer.element("blockquote", &[("data-blend-selector", "#quote")]);
		append(&quote, &renderer.text("To be, or not to be"));
		append(&renderer.root, &quote);
		quote
	});

	assert_eq!(warnings, 1);
	let vnode = vnode_of(&Value::Object(quote)).unwrap();
	assert_eq!(vnode.state(), VNodeState::Pending);
	assert_eq!(vnode.children()[0].state(), VNodeState::Pending);
	assert!(page.query_selector("blockquote").unwrap().is_none());
}

#[test]
fn text_replaces_existing_content_once() {
	let page = Node::new_document();
	let greeting = page.create_element("p");
	greeting.set_attribute("id", "greeting");
	greeting.append_child(&page.create_text_node("Hello ")).unwrap();
	let bold = page.create_element("b");
	bold.append_child(&page.create_text_node("old")).unwrap();
	greeting.append_child(&bold).unwrap();
	page.body().unwrap().append_child(&greeting).unwrap();

	let renderer = Renderer::new(&page.body().unwrap());
	let generated = renderer.element("p", &[("id", "greeting")]);
	append(&renderer.root, &generated);
	append(&generated, &renderer.text("Hi, "));
	append(&generated, &renderer.text("there"));
	assert_eq!(greeting.inner_html(), "Hi, there");

	remove(&renderer.root, &generated);
	assert_eq!(greeting.inner_html(), "Hello <b>old</b>");
}

#[test]
fn unmatched_subtree_is_inserted_and_removed() {
	let page = Node::new_document();
	let body = page.body().unwrap();
	let renderer = Renderer::new(&body);

	let section = renderer.element("section", &[]);
	let heading = renderer.element("h1", &[]);
	append(&heading, &renderer.text("Title"));
	append(&section, &heading);
	append(&section, &renderer.element("p", &[]));
	append(&renderer.root, &section);

	assert_eq!(body.inner_html(), "<div id=\"_blendRoot\"></div><section><h1>Title</h1><p></p></section>");
	let heading = vnode_of(&Value::Object(heading)).unwrap();
	assert_eq!(heading.state(), VNodeState::Direct);
	assert_eq!(heading.children()[0].state(), VNodeState::Direct);

	remove(&renderer.root, &section);
	assert_eq!(body.inner_html(), "<div id=\"_blendRoot\"></div>");
	assert_eq!(heading.state(), VNodeState::Detached);
}

#[test]
fn deferred_mutations_replay_in_order() {
	let (page, phone) = signup_page();
	phone.set_attribute("title", "original");

	let renderer = Renderer::new(&page.body().unwrap());
	let form = renderer.element("form", &[("id", "signup")]);
	let input = renderer.element("input", &[("name", "phone")]);
	input.call("setAttribute", &["title".into(), "first".into()]).unwrap();
	input.call("setAttribute", &["title".into(), "second".into()]).unwrap();
	input.set("_fiber", 7.0.into()).unwrap();
	append(&form, &input);
	append(&renderer.root, &form);

	assert_eq!(phone.get_attribute("title").as_deref(), Some("second"));
	assert_eq!(phone.get("_fiber"), Value::Number(7.0));

	remove(&renderer.root, &form);
	assert_eq!(phone.get_attribute("title").as_deref(), Some("original"));
	assert_eq!(phone.get("_fiber"), Value::Undefined);
}

#[test]
fn insert_before_follows_merged_siblings() {
	let page = Node::new_document();
	let list = page.create_element("ul");
	list.set_attribute("id", "list");
	list.append_child(&page.create_element("li")).unwrap();
	page.body().unwrap().append_child(&list).unwrap();

	let renderer = Renderer::new(&page.body().unwrap());
	let generated = renderer.element("ul", &[("id", "list")]);
	append(&renderer.root, &generated);
	let a = renderer.element("li", &[("class", "a")]);
	append(&generated, &a);
	let b = renderer.element("li", &[("class", "b")]);
	insert_before(&generated, &b, &a);

	assert_eq!(list.inner_html(), "<li></li><li class=\"b\"></li><li class=\"a\"></li>");

	remove(&generated, &a);
	assert_eq!(list.inner_html(), "<li></li><li class=\"b\"></li>");
	remove(&renderer.root, &generated);
	assert_eq!(list.inner_html(), "<li></li>");
}

#[test]
fn traced_render_with_component() {
	let page = Node::new_document();
	let form = page.create_element("form");
	form.set_attribute("class", "signup");
	page.body().unwrap().append_child(&form).unwrap();
	let body: HostRef = page.body().unwrap();

	let resolved = Rc::new(Cell::new(false));
	let root = blend(
		|root| {
			let document = root.get("ownerDocument").into_object().unwrap();
			let element = Attach::new("form.signup").tag("form").attribute("novalidate", "").create(&document)?;
			assert!(on_resolved(&Value::Object(element.clone()), {
				let resolved = resolved.clone();
				move |target| resolved.set(target.tag_name().as_deref() == Some("form"))
			}));
			root.call("appendChild", &[Value::Object(element)]).map(drop)
		},
		&body,
		BlendOptions {
			trace_use: true,
			..BlendOptions::default()
		},
	)
	.unwrap();

	assert!(resolved.get());
	assert!(form.has_attribute("novalidate"));
	assert!(!form.has_attribute("data-blend-selector"));
	assert_eq!(page.query_selector_all("form").unwrap().len(), 1);
	drop(root);
}

#[test]
fn generated_radios_stay_apart() {
	let page = Node::new_document();
	let body = page.body().unwrap();
	let renderer = Renderer::new(&body);

	let fieldset = renderer.element("fieldset", &[]);
	let red = renderer.element("input", &[("type", "radio"), ("name", "color"), ("value", "red")]);
	let blue = renderer.element("input", &[("type", "radio"), ("name", "color"), ("value", "blue")]);
	append(&fieldset, &red);
	append(&fieldset, &blue);
	append(&renderer.root, &fieldset);

	let blue = vnode_of(&Value::Object(blue)).unwrap();
	assert_eq!(blue.state(), VNodeState::Direct);
	assert_eq!(red.get_attribute("value").unwrap().as_deref(), Some("red"));
	assert_eq!(
		body.inner_html(),
		"<div id=\"_blendRoot\"></div><fieldset>\
		<input type=\"radio\" name=\"color\" value=\"red\">\
		<input type=\"radio\" name=\"color\" value=\"blue\">\
		</fieldset>"
	);
}

#[test]
fn generated_siblings_are_not_merged_onto() {
	let page = Node::new_document();
	let body = page.body().unwrap();
	let renderer = Renderer::new(&body);

	let first = renderer.element("input", &[("name", "phone"), ("placeholder", "Home")]);
	let second = renderer.element("input", &[("name", "phone"), ("placeholder", "Work")]);
	append(&renderer.root, &first);
	append(&renderer.root, &second);

	assert_eq!(vnode_of(&Value::Object(second.clone())).unwrap().state(), VNodeState::Direct);
	assert_eq!(first.get_attribute("placeholder").unwrap().as_deref(), Some("Home"));
	assert_eq!(page.query_selector_all("input").unwrap().len(), 2);

	remove(&renderer.root, &second);
	remove(&renderer.root, &first);
	assert_eq!(body.inner_html(), "<div id=\"_blendRoot\"></div>");
}

#[test]
fn clean_slate_spares_merged_children() {
	let page = Node::new_document();
	let greeting = page.create_element("p");
	greeting.set_attribute("id", "greeting");
	greeting.append_child(&page.create_text_node("Hello ")).unwrap();
	let name = page.create_element("b");
	name.set_attribute("id", "name");
	name.append_child(&page.create_text_node("old")).unwrap();
	greeting.append_child(&name).unwrap();
	page.body().unwrap().append_child(&greeting).unwrap();

	let renderer = Renderer::new(&page.body().unwrap());
	let generated = renderer.element("p", &[("id", "greeting")]);
	append(&renderer.root, &generated);
	let generated_name = renderer.element("b", &[("id", "name"), ("class", "highlight")]);
	append(&generated, &generated_name);
	append(&generated, &renderer.text("Hi, "));

	assert_eq!(greeting.inner_html(), "<b id=\"name\" class=\"highlight\">old</b>Hi, ");
	let merged = vnode_of(&Value::Object(generated_name)).unwrap();
	assert!(merged.target().unwrap().same(&(name.clone() as HostRef)));

	remove(&renderer.root, &generated);
	assert_eq!(greeting.inner_html(), "Hello <b id=\"name\">old</b>");
}

#[test]
fn insert_before_a_merged_sibling() {
	let page = Node::new_document();
	let list = page.create_element("ul");
	list.set_attribute("id", "list");
	let first = page.create_element("li");
	first.set_attribute("id", "first");
	list.append_child(&first).unwrap();
	page.body().unwrap().append_child(&list).unwrap();

	let renderer = Renderer::new(&page.body().unwrap());
	let generated = renderer.element("ul", &[("id", "list")]);
	append(&renderer.root, &generated);
	let generated_first = renderer.element("li", &[("id", "first")]);
	append(&generated, &generated_first);
	assert_eq!(vnode_of(&Value::Object(generated_first.clone())).unwrap().state(), VNodeState::Attached);

	let added = renderer.element("li", &[("class", "new")]);
	insert_before(&generated, &added, &generated_first);
	assert_eq!(list.inner_html(), "<li class=\"new\"></li><li id=\"first\"></li>");

	remove(&renderer.root, &generated);
	assert_eq!(list.inner_html(), "<li id=\"first\"></li>");
}
