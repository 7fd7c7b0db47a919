//! Stamping page numbers, running headers, id badges and the index onto a
//! compiled songbook.
//!
//! The songs' first pages come from the engine log: the document template
//! writes `SONGBOOK-ANCHOR:<token>:<page>` for every anchor as its page is
//! shipped out. Everything stamped is drawn in its own content stream after
//! the page's original content, wrapped so the original graphics state
//! can't leak into it.

mod fonts;
mod layout;

use self::fonts::{BOLD, REGULAR};
use self::layout::{IndexLine, PageBox};
use crate::assembler::Anchor;
use crate::error::{ErrorKind, Result};
use crate::options::BuildOptions;
use exn::ResultExt;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use regex::Regex;
use serde::{Deserialize, Serialize};
use songbook_catalog::SongId;
use songbook_typeset::CompiledDocument;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::instrument;

static ANCHOR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"SONGBOOK-ANCHOR:([A-Za-z0-9]+):(\d+)").unwrap_or_else(|_| unreachable!("anchor pattern is a valid regex"))
});

/// Page inheritance chains deeper than this are treated as broken.
const MAX_TREE_DEPTH: usize = 32;

/// Where one requested song starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: SongId,
    pub title: String,
    /// 1-based physical page.
    pub page: u32,
}

#[derive(Debug, Clone)]
pub struct StampedDocument {
    pub pdf: Vec<u8>,
    /// Including appended index pages.
    pub pages: u32,
    /// One per requested song, in request order.
    pub entries: Vec<IndexEntry>,
}

#[derive(Debug, Clone, Copy)]
struct FontIds {
    regular: ObjectId,
    bold: ObjectId,
}

/// Find each anchor's page in the engine log.
///
/// The first report of a token wins. Anchors that were never reported, or
/// reported outside the document, fail the build with the affected song ids.
pub(crate) fn resolve_anchors(log: &str, anchors: &[Anchor], pages: u32) -> Result<Vec<IndexEntry>> {
    let mut reported: HashMap<&str, u32> = HashMap::new();
    for captures in ANCHOR_LINE.captures_iter(log) {
        let (Some(token), Some(page)) = (captures.get(1), captures.get(2)) else {
            continue;
        };
        if let Ok(page) = page.as_str().parse::<u32>() {
            reported.entry(token.as_str()).or_insert(page);
        }
    }

    let mut entries = Vec::with_capacity(anchors.len());
    let mut missing: Vec<SongId> = Vec::new();
    for anchor in anchors {
        match reported.get(anchor.token.as_str()) {
            Some(&page) if (1..=pages).contains(&page) => {
                entries.push(IndexEntry { id: anchor.song.clone(), title: anchor.title.clone(), page })
            },
            _ if missing.contains(&anchor.song) => {},
            _ => missing.push(anchor.song.clone()),
        }
    }
    if !missing.is_empty() {
        exn::bail!(ErrorKind::IndexResolution(missing));
    }
    Ok(entries)
}

/// Stamp `compiled` according to `options`.
#[instrument(skip_all, fields(pages = compiled.pages, songs = anchors.len()))]
pub fn stamp(compiled: &CompiledDocument, anchors: &[Anchor], options: &BuildOptions) -> Result<StampedDocument> {
    let entries = resolve_anchors(&compiled.log, anchors, compiled.pages)?;
    let mut doc = Document::load_mem(&compiled.pdf).or_raise(|| ErrorKind::Pdf)?;
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    let fonts = FontIds { regular: doc.add_object(REGULAR.dictionary()), bold: doc.add_object(BOLD.dictionary()) };

    let mut last_box = PageBox::A4;
    for (index, page_id) in page_ids.iter().enumerate() {
        let number = index as u32 + 1;
        let page_box = media_box(&doc, *page_id).unwrap_or(PageBox::A4);
        last_box = page_box;

        let mut ops = Vec::new();
        if options.page_numbering {
            if let Some(title) = continued_title(&entries, number) {
                ops.extend(layout::running_header(page_box, number, title));
            }
            ops.extend(layout::footer(page_box, number));
        }
        if options.song_id_badges {
            for (slot, entry) in entries.iter().filter(|e| e.page == number).enumerate() {
                ops.extend(layout::badge(page_box, entry.id.as_str(), slot));
            }
        }
        if !ops.is_empty() {
            overlay(&mut doc, *page_id, fonts, ops)?;
        }
    }

    let mut pages = page_ids.len() as u32;
    if options.include_index {
        pages += append_index(&mut doc, fonts, last_box, options, &entries, pages + 1)?;
    }

    let mut pdf = Vec::new();
    doc.save_to(&mut pdf).or_raise(|| ErrorKind::Pdf)?;
    tracing::debug!(pages, "Stamped document");
    Ok(StampedDocument { pdf, pages, entries })
}

/// Title for the running header of page `number`: the song in effect there,
/// unless a song starts on that page.
fn continued_title(entries: &[IndexEntry], number: u32) -> Option<&str> {
    if entries.iter().any(|e| e.page == number) {
        return None;
    }
    entries.iter().filter(|e| e.page < number).max_by_key(|e| e.page).map(|e| e.title.as_str())
}

fn index_lines(entries: &[IndexEntry]) -> Vec<IndexLine> {
    let mut sorted: Vec<&IndexEntry> = entries.iter().collect();
    sorted.sort_by_cached_key(|e| (deunicode::deunicode(&e.title).to_lowercase(), e.page, e.id.clone()));
    sorted.into_iter().map(|e| IndexLine { title: e.title.clone(), page: e.page }).collect()
}

/// Returns the number of pages added.
fn append_index(
    doc: &mut Document,
    fonts: FontIds,
    page_box: PageBox,
    options: &BuildOptions,
    entries: &[IndexEntry],
    first_number: u32,
) -> Result<u32> {
    let pages_id = doc
        .catalog()
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .or_raise(|| ErrorKind::Pdf)?;
    let resources = dictionary! {
        "Font" => dictionary! {
            REGULAR.resource => fonts.regular,
            BOLD.resource => fonts.bold,
        },
    };
    let media_box: Vec<Object> =
        [page_box.x0, page_box.y0, page_box.x1, page_box.y1].into_iter().map(|v| Object::Real(v.into())).collect();

    let mut kids = Vec::new();
    for (offset, mut operations) in
        layout::index_pages(page_box, &options.index_heading, &index_lines(entries)).into_iter().enumerate()
    {
        if options.page_numbering {
            operations.extend(layout::footer(page_box, first_number + offset as u32));
        }
        let content = Content { operations }.encode().or_raise(|| ErrorKind::Pdf)?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => media_box.clone(),
            "Resources" => resources.clone(),
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let added = kids.len() as u32;
    let root = doc.get_dictionary_mut(pages_id).or_raise(|| ErrorKind::Pdf)?;
    let count = root.get(b"Count").and_then(Object::as_i64).or_raise(|| ErrorKind::Pdf)?;
    root.get_mut(b"Kids").and_then(Object::as_array_mut).or_raise(|| ErrorKind::Pdf)?.extend(kids);
    root.set("Count", count + i64::from(added));
    Ok(added)
}

/// Draw `ops` over the page's existing content.
fn overlay(doc: &mut Document, page_id: ObjectId, fonts: FontIds, ops: Vec<Operation>) -> Result<()> {
    let resources = resources_with_fonts(doc, page_id, fonts);
    let existing = doc.get_dictionary(page_id).or_raise(|| ErrorKind::Pdf)?.get(b"Contents").ok().cloned();
    let mut contents: Vec<Object> = match existing {
        Some(Object::Reference(id)) => match doc.get_object(id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(id)],
        },
        Some(Object::Array(items)) => items,
        _ => Vec::new(),
    };

    let open = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let mut operations = vec![Operation::new("Q", vec![])];
    operations.extend(ops);
    let stamped = Content { operations }.encode().or_raise(|| ErrorKind::Pdf)?;
    let close = doc.add_object(Stream::new(dictionary! {}, stamped));
    contents.insert(0, Object::Reference(open));
    contents.push(Object::Reference(close));

    let page = doc.get_dictionary_mut(page_id).or_raise(|| ErrorKind::Pdf)?;
    page.set("Contents", contents);
    page.set("Resources", resources);
    Ok(())
}

/// The page's effective resources, as a direct dictionary, with the stamp fonts added.
fn resources_with_fonts(doc: &Document, page_id: ObjectId, fonts: FontIds) -> Dictionary {
    let mut resources = inherited(doc, page_id, b"Resources")
        .and_then(|object| dereference(doc, object).as_dict().ok())
        .cloned()
        .unwrap_or_else(Dictionary::new);
    let mut font_map = resources
        .get(b"Font")
        .ok()
        .and_then(|object| dereference(doc, object).as_dict().ok())
        .cloned()
        .unwrap_or_else(Dictionary::new);
    font_map.set(REGULAR.resource, fonts.regular);
    font_map.set(BOLD.resource, fonts.bold);
    resources.set("Font", font_map);
    resources
}

fn media_box(doc: &Document, page_id: ObjectId) -> Option<PageBox> {
    let values = dereference(doc, inherited(doc, page_id, b"MediaBox")?).as_array().ok()?;
    let numbers: Vec<f32> = values.iter().filter_map(|v| number(dereference(doc, v))).collect();
    match numbers[..] {
        [x0, y0, x1, y1] => Some(PageBox { x0: x0.min(x1), y0: y0.min(y1), x1: x0.max(x1), y1: y0.max(y1) }),
        _ => None,
    }
}

/// Look a page attribute up, following `Parent` links for inheritable ones.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn dereference<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        other => other,
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(f32::from(*value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use songbook_typeset::mock::pdf_with_pages;

    fn anchor(token: &str, song: &str, title: &str) -> Anchor {
        Anchor { token: token.to_string(), song: SongId::from(song), title: title.to_string() }
    }

    /// Three pages: "Zem" on 1, "Čas" on 2 and 3, a blank 4th page.
    fn compiled() -> (CompiledDocument, Vec<Anchor>) {
        let texts: Vec<String> = ["Zem", "Cas", "Cas continued", ""].iter().map(|s| s.to_string()).collect();
        let log = "This is LuaHBTeX\nSONGBOOK-ANCHOR:sb0001:1\nSONGBOOK-ANCHOR:sb0002:2\n[1] [2] [3] [4]\n";
        let document =
            CompiledDocument { pdf: pdf_with_pages(&texts).unwrap(), pages: 4, log: log.to_string(), passes: 1 };
        (document, vec![anchor("sb0001", "Z-001", "Zem"), anchor("sb0002", "C-001", "Čas")])
    }

    /// Text shown on a page, one string per `Tj`.
    fn shown(pdf: &[u8], page: u32) -> Vec<String> {
        let doc = Document::load_mem(pdf).unwrap();
        let page_id = doc.get_pages()[&page];
        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        content
            .operations
            .iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| match op.operands.first() {
                Some(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).into_owned()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_resolve_first_report_wins() {
        let log = "SONGBOOK-ANCHOR:sb0001:3\nSONGBOOK-ANCHOR:sb0002:5\nSONGBOOK-ANCHOR:sb0001:4\n";
        let anchors = [anchor("sb0001", "A-001", "A"), anchor("sb0002", "B-001", "B")];
        let entries = resolve_anchors(log, &anchors, 10).unwrap();
        assert_eq!(entries.iter().map(|e| e.page).collect::<Vec<_>>(), [3, 5]);
    }

    #[test]
    fn test_resolve_reports_missing_and_out_of_range() {
        let log = "SONGBOOK-ANCHOR:sb0001:2\nSONGBOOK-ANCHOR:sb0002:0\nSONGBOOK-ANCHOR:sb0003:99\n";
        let anchors = [
            anchor("sb0001", "A-001", "A"),
            anchor("sb0002", "B-001", "B"),
            anchor("sb0003", "C-001", "C"),
            anchor("sb0004", "B-001", "B"),
        ];
        let err = resolve_anchors(log, &anchors, 10).unwrap_err();
        match &*err {
            ErrorKind::IndexResolution(ids) => {
                assert_eq!(ids, &[SongId::from("B-001"), SongId::from("C-001")]);
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_numbers_headers_and_index() {
        let (document, anchors) = compiled();
        let stamped = stamp(&document, &anchors, &BuildOptions::default()).unwrap();
        assert_eq!(stamped.pages, 5);
        assert_eq!(
            stamped.entries,
            vec![
                IndexEntry { id: SongId::from("Z-001"), title: "Zem".to_string(), page: 1 },
                IndexEntry { id: SongId::from("C-001"), title: "Čas".to_string(), page: 2 },
            ]
        );

        // Song openings carry no running header.
        assert_eq!(shown(&stamped.pdf, 1), ["Zem", "1"]);
        assert_eq!(shown(&stamped.pdf, 2), ["Cas", "2"]);
        // Continuations do; "Čas" transliterated for the standard fonts.
        assert_eq!(shown(&stamped.pdf, 3), ["Cas continued", "Cas", "3"]);
        assert_eq!(shown(&stamped.pdf, 4), ["", "Cas", "4"]);
        // Index sorted ignoring accents, and numbered itself.
        assert_eq!(shown(&stamped.pdf, 5), ["Index", "Čas", "2", "Zem", "1", "5"].map(|s| {
            String::from_utf8_lossy(&fonts::encode(s)).into_owned()
        }));
    }

    #[test]
    fn test_plain_output() {
        let (document, anchors) = compiled();
        let options =
            BuildOptions { include_index: false, page_numbering: false, song_id_badges: false, ..Default::default() };
        let stamped = stamp(&document, &anchors, &options).unwrap();
        assert_eq!(stamped.pages, 4);
        assert_eq!(shown(&stamped.pdf, 1), ["Zem"]);
        assert_eq!(shown(&stamped.pdf, 3), ["Cas continued"]);
    }

    #[test]
    fn test_badges_on_first_pages() {
        let (document, anchors) = compiled();
        let options = BuildOptions { song_id_badges: true, page_numbering: false, ..Default::default() };
        let stamped = stamp(&document, &anchors, &options).unwrap();
        assert_eq!(shown(&stamped.pdf, 1), ["Zem", "Z-001"]);
        assert_eq!(shown(&stamped.pdf, 2), ["Cas", "C-001"]);
        assert_eq!(shown(&stamped.pdf, 3), ["Cas continued"]);
    }

    #[test]
    fn test_original_resources_survive() {
        let (document, anchors) = compiled();
        let stamped = stamp(&document, &anchors, &BuildOptions::default()).unwrap();
        let doc = Document::load_mem(&stamped.pdf).unwrap();
        let page_id = doc.get_pages()[&1];
        let resources = doc.get_dictionary(page_id).unwrap().get(b"Resources").unwrap().as_dict().unwrap();
        let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
        assert!(fonts.has(b"F1"));
        assert!(fonts.has(REGULAR.resource.as_bytes()));
        assert!(fonts.has(BOLD.resource.as_bytes()));
    }

    #[test]
    fn test_long_index_paginates() {
        let titles: Vec<String> = (0..100).map(|i| format!("Song {i:03}")).collect();
        let log: String = (0..100).map(|i| format!("SONGBOOK-ANCHOR:sb{:04}:{}\n", i + 1, i + 1)).collect();
        let anchors: Vec<Anchor> =
            titles.iter().enumerate().map(|(i, t)| anchor(&format!("sb{:04}", i + 1), &format!("S-{i:03}"), t)).collect();
        let document = CompiledDocument { pdf: pdf_with_pages(&titles).unwrap(), pages: 100, log, passes: 1 };
        let stamped = stamp(&document, &anchors, &BuildOptions::default()).unwrap();
        assert!(stamped.pages > 101);
        let doc = Document::load_mem(&stamped.pdf).unwrap();
        assert_eq!(doc.get_pages().len() as u32, stamped.pages);
        assert_eq!(shown(&stamped.pdf, stamped.pages).last().unwrap(), &stamped.pages.to_string());
    }

    #[test]
    fn test_unreadable_pdf() {
        let (mut document, anchors) = compiled();
        document.pdf = b"not a pdf at all".to_vec();
        let err = stamp(&document, &anchors, &BuildOptions::default()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Pdf));
    }
}
