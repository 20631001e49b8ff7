//! RFC 6376 section 3.2 tag-value list grammar, shared by ARC-Seal,
//! ARC-Message-Signature, ARC-Authentication-Results and DNS key records.

use crate::tables::Kind;
use crate::ArcError;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::alpha1;
use nom::combinator::opt;
use nom::multi::fold_many0;
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::IResult;
use nom::Parser;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub value: String,
    pub raw_value: String,
}

fn fws(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c == ' ' || c == '\t' || c == '\r' || c == '\n')(input)
}

fn tag_name(input: &str) -> IResult<&str, &str> {
    alpha1(input)
}

fn is_valchar(c: char) -> bool {
    matches!(c as u32, 0x21..=0x3A | 0x3C..=0x7E)
}

fn raw_tag_value(input: &str) -> IResult<&str, &str> {
    take_while1(is_valchar)(input)
}

fn tag_value(input: &str) -> IResult<&str, String> {
    let (rest, raw) = raw_tag_value(input)?;
    Ok((rest, raw.to_owned()))
}

fn tag_spec(input: &str) -> IResult<&str, Tag> {
    let (input, _) = opt(fws).parse(input)?;
    let (input, name) = tag_name(input)?;
    let (input, _) = opt(fws).parse(input)?;
    let (input, _) = tag("=")(input)?;
    let (input, _) = opt(fws).parse(input)?;
    let (input, raw_value) = opt(raw_tag_value).parse(input)?;
    let raw_value = raw_value.unwrap_or_default();
    let (input, _) = opt(fws).parse(input)?;

    Ok((
        input,
        Tag {
            name: name.to_owned(),
            value: raw_value.to_owned(),
            raw_value: raw_value.to_owned(),
        },
    ))
}

fn tag_list(input: &str) -> IResult<&str, Vec<Tag>> {
    let (input, first) = tag_spec(input)?;
    let (input, mut rest) = fold_many0(
        preceded(pair(opt(fws), tag(";")), tag_spec),
        Vec::new,
        |mut acc, t| {
            acc.push(t);
            acc
        },
    )
    .parse(input)?;
    let (input, _) = opt(delimited(opt(fws), tag(";"), opt(fws))).parse(input)?;
    let (input, _) = terminated(opt(fws), nom::combinator::eof).parse(input)?;

    let mut tags = vec![first];
    tags.append(&mut rest);
    Ok((input, tags))
}

/// Which tags must be present for each header/record kind. `i=` is
/// required on every kind except DNS key records.
fn required_tags(kind: Kind) -> &'static [&'static str] {
    match kind {
        Kind::Seal => &["i", "a", "b", "d", "s", "t", "cv"],
        Kind::Signature => &["i", "a", "b", "bh", "d", "h", "s"],
        Kind::Key => &["p"],
    }
}

/// A parsed tag-value set, indexed for O(1)-ish lookup by first byte of
/// the tag name (a small closed alphabet, so a 95-bucket array beats a
/// hash map for the handful of tags a header carries).
#[derive(Debug, Clone)]
pub struct TagValueSet {
    tags: Vec<Tag>,
    index: HashMap<String, usize>,
}

const BUCKET_COUNT: usize = 95;

fn bucket_of(name: &str) -> Option<usize> {
    let first = name.as_bytes().first().copied()?;
    if (0x21..=0x7E).contains(&first) {
        Some((first - 0x21) as usize)
    } else {
        None
    }
}

impl TagValueSet {
    /// Parses `raw` as a tag-value list and validates it against `kind`'s
    /// grammar: no duplicate tags, all required tags present, and (for
    /// every kind but DNS key records) the first tag must be `i=`.
    pub fn parse(raw: &str, kind: Kind) -> Result<Self, ArcError> {
        let (_, tags) = tag_list(raw).map_err(|err| ArcError::SyntaxError(err.to_string()))?;

        if kind != Kind::Key {
            match tags.first() {
                Some(t) if t.name == "i" => {}
                _ => return Err(ArcError::FirstTagNotInstance),
            }
        }

        let mut buckets: [Vec<u16>; BUCKET_COUNT] = std::array::from_fn(|_| Vec::new());
        let mut index = HashMap::new();
        for (pos, t) in tags.iter().enumerate() {
            if index.insert(t.name.clone(), pos).is_some() {
                return Err(ArcError::DuplicateTag(t.name.clone()));
            }
            if let Some(b) = bucket_of(&t.name) {
                buckets[b].push(pos as u16);
            }
        }

        for required in required_tags(kind) {
            if !index.contains_key(*required) {
                return Err(ArcError::MissingRequiredTag(required));
            }
        }

        Ok(Self { tags, index })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.index.get(name).map(|&i| self.tags[i].value.as_str())
    }

    pub fn get_required(&self, name: &'static str) -> Result<&str, ArcError> {
        self.get(name).ok_or(ArcError::MissingRequiredTag(name))
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }
}
