//! A small CSS selector engine.
//!
//! Supported: type and universal selectors, `#id`, `.class`, `[attr]`, `[attr=value]` (with quoted or bare values and CSS escapes),
//! the descendant and child (`>`) combinators, and comma-separated selector lists.

use super::Node;
use crate::host::HostError;
use core::{iter::Peekable, str::Chars};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList(Vec<Complex>);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
	/// Right-most compound last.
	compounds: Vec<Compound>,
	/// `combinators[i]` sits between `compounds[i]` and `compounds[i + 1]`.
	combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
	Descendant,
	Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
	tag: Option<String>,
	id: Option<String>,
	classes: Vec<String>,
	attributes: Vec<(String, Option<String>)>,
}

impl SelectorList {
	/// # Errors
	///
	/// [`HostError::Syntax`] iff `input` isn't a selector list this engine understands.
	pub fn parse(input: &str) -> Result<Self, HostError> {
		let syntax = || HostError::Syntax(input.to_owned());
		let mut chars = input.chars().peekable();
		let mut list = Vec::new();
		loop {
			list.push(parse_complex(&mut chars).ok_or_else(syntax)?);
			skip_whitespace(&mut chars);
			match chars.next() {
				None => break,
				Some(',') => continue,
				Some(_) => return Err(syntax()),
			}
		}
		Ok(Self(list))
	}

	#[must_use]
	pub fn matches(&self, element: &Node) -> bool {
		self.0.iter().any(|complex| complex.matches(element))
	}
}

impl Complex {
	fn matches(&self, element: &Node) -> bool {
		match self.compounds.split_last() {
			Some((last, _)) if last.matches(element) => self.matches_ancestors(self.compounds.len() - 1, element),
			_ => false,
		}
	}

	/// Whether `compounds[..index]` match, given that `compounds[index]` matched `element`.
	fn matches_ancestors(&self, index: usize, element: &Node) -> bool {
		if index == 0 {
			return true;
		}
		let compound = &self.compounds[index - 1];
		let mut ancestor = element.parent_element();
		while let Some(candidate) = ancestor {
			if compound.matches(&candidate) && self.matches_ancestors(index - 1, &candidate) {
				return true;
			}
			if self.combinators[index - 1] == Combinator::Child {
				return false;
			}
			ancestor = candidate.parent_element();
		}
		false
	}
}

impl Compound {
	fn matches(&self, element: &Node) -> bool {
		let Some(local_name) = element.local_name() else {
			return false;
		};
		if let Some(tag) = &self.tag {
			if !tag.eq_ignore_ascii_case(local_name) {
				return false;
			}
		}
		if let Some(id) = &self.id {
			if element.get_attribute("id").as_deref() != Some(id.as_str()) {
				return false;
			}
		}
		if !self.classes.is_empty() {
			let class = element.get_attribute("class").unwrap_or_default();
			if !self.classes.iter().all(|wanted| class.split_ascii_whitespace().any(|class| class == wanted)) {
				return false;
			}
		}
		self.attributes.iter().all(|(name, value)| match (element.get_attribute(name), value) {
			(None, _) => false,
			(Some(_), None) => true,
			(Some(actual), Some(value)) => actual == *value,
		})
	}

	fn is_empty(&self) -> bool {
		self.tag.is_none() && self.id.is_none() && self.classes.is_empty() && self.attributes.is_empty()
	}
}

type Input<'a> = Peekable<Chars<'a>>;

fn parse_complex(chars: &mut Input) -> Option<Complex> {
	skip_whitespace(chars);
	let mut compounds = vec![parse_compound(chars)?];
	let mut combinators = Vec::new();
	loop {
		let had_whitespace = skip_whitespace(chars);
		let combinator = match chars.peek() {
			None | Some(',') => break,
			Some('>') => {
				chars.next();
				skip_whitespace(chars);
				Combinator::Child
			}
			Some(_) if had_whitespace => Combinator::Descendant,
			Some(_) => return None,
		};
		combinators.push(combinator);
		compounds.push(parse_compound(chars)?);
	}
	Some(Complex { compounds, combinators })
}

fn parse_compound(chars: &mut Input) -> Option<Compound> {
	let mut compound = Compound::default();
	match chars.peek() {
		Some('*') => {
			chars.next();
			return parse_subclasses(chars, compound, true);
		}
		Some(&c) if is_identifier_start(c) => compound.tag = Some(parse_identifier(chars)?.to_ascii_lowercase()),
		_ => (),
	}
	parse_subclasses(chars, compound, false)
}

fn parse_subclasses(chars: &mut Input, mut compound: Compound, universal: bool) -> Option<Compound> {
	loop {
		match chars.peek() {
			Some('#') => {
				chars.next();
				compound.id = Some(parse_identifier(chars)?);
			}
			Some('.') => {
				chars.next();
				compound.classes.push(parse_identifier(chars)?);
			}
			Some('[') => {
				chars.next();
				compound.attributes.push(parse_attribute(chars)?);
			}
			_ => break,
		}
	}
	(universal || !compound.is_empty()).then_some(compound)
}

fn parse_attribute(chars: &mut Input) -> Option<(String, Option<String>)> {
	skip_whitespace(chars);
	let name = parse_identifier(chars)?.to_ascii_lowercase();
	skip_whitespace(chars);
	let value = match chars.next()? {
		']' => return Some((name, None)),
		'=' => {
			skip_whitespace(chars);
			match chars.peek()? {
				'"' | '\'' => parse_string(chars)?,
				_ => parse_identifier(chars)?,
			}
		}
		_ => return None,
	};
	skip_whitespace(chars);
	(chars.next()? == ']').then_some((name, Some(value)))
}

fn parse_identifier(chars: &mut Input) -> Option<String> {
	let mut identifier = String::new();
	match chars.peek() {
		Some(&c) if is_identifier_start(c) || c == '\\' => (),
		_ => return None,
	}
	while let Some(&c) = chars.peek() {
		if c == '\\' {
			chars.next();
			identifier.push(parse_escape(chars)?);
		} else if is_identifier_char(c) {
			chars.next();
			identifier.push(c);
		} else {
			break;
		}
	}
	Some(identifier)
}

fn parse_string(chars: &mut Input) -> Option<String> {
	let quote = chars.next()?;
	let mut string = String::new();
	loop {
		match chars.next()? {
			c if c == quote => return Some(string),
			'\\' => string.push(parse_escape(chars)?),
			c => string.push(c),
		}
	}
}

/// Parses what follows a backslash.
fn parse_escape(chars: &mut Input) -> Option<char> {
	let mut hex = String::new();
	while hex.len() < 6 {
		match chars.peek() {
			Some(&c) if c.is_ascii_hexdigit() => {
				hex.push(c);
				chars.next();
			}
			_ => break,
		}
	}
	if hex.is_empty() {
		return chars.next();
	}
	if chars.peek() == Some(&' ') {
		chars.next();
	}
	let code = u32::from_str_radix(&hex, 16).ok()?;
	Some(char::from_u32(code).filter(|&c| c != '\0').unwrap_or(char::REPLACEMENT_CHARACTER))
}

fn skip_whitespace(chars: &mut Input) -> bool {
	let mut skipped = false;
	while chars.next_if(|c| c.is_ascii_whitespace()).is_some() {
		skipped = true;
	}
	skipped
}

fn is_identifier_start(c: char) -> bool {
	c.is_ascii_alphabetic() || c == '_' || c == '-' || !c.is_ascii()
}

fn is_identifier_char(c: char) -> bool {
	is_identifier_start(c) || c.is_ascii_digit()
}

#[cfg(test)]
mod tests {
	use super::SelectorList;
	use crate::memory::Node;

	#[test]
	fn rejects_garbage() {
		for input in ["", "#", "div >", "[name=", "a,,b", "#1abc", "a ~ b"] {
			assert!(SelectorList::parse(input).is_err(), "{:?}", input);
		}
	}

	#[test]
	fn matches_compounds_and_combinators() {
		let document = Node::new_document();
		let body = document.body().unwrap();
		let form = document.create_element("form");
		form.set_attribute("class", "signup wide");
		let input = document.create_element("input");
		input.set_attribute("name", "phone \"home\"");
		input.set_attribute("id", "a:b");
		let fieldset = document.create_element("fieldset");
		body.append_child(&form).unwrap();
		form.append_child(&fieldset).unwrap();
		fieldset.append_child(&input).unwrap();

		let matches = |selector: &str| SelectorList::parse(selector).unwrap().matches(&input);
		assert!(matches("input"));
		assert!(matches("*"));
		assert!(matches("INPUT[name]"));
		assert!(matches(r#"input[name="phone \"home\""]"#));
		assert!(matches(r"#a\:b"));
		assert!(matches(r#"input[id="a:b"]"#));
		assert!(matches("form.signup input"));
		assert!(matches("body form.wide > fieldset > input"));
		assert!(matches("button, fieldset>input"));
		assert!(!matches("form > input"));
		assert!(!matches("form.narrow input"));
		assert!(!matches("input[name=phone]"));
	}
}
