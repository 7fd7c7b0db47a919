//! Where stamped things go on a page, as content stream operations.

use super::fonts::{self, BOLD, Font, REGULAR};
use lopdf::Object;
use lopdf::content::Operation;

const FOOTER_OFFSET: f32 = 28.0;
const FOOTER_SIZE: f32 = 9.0;
const HEADER_OFFSET: f32 = 30.0;
const HEADER_SIZE: f32 = 9.0;
const MARGIN: f32 = 56.0;
const GRAY: f32 = 0.45;

const BADGE_WIDTH: f32 = 100.0;
const BADGE_HEIGHT: f32 = 50.0;
const BADGE_RIGHT: f32 = 15.0;
const BADGE_TOP: f32 = 20.0;
const BADGE_RADIUS: f32 = 8.0;
const BADGE_SIZE: f32 = 28.0;
const BADGE_PADDING: f32 = 6.0;
const BADGE_GAP: f32 = 8.0;
const BADGE_FILL: [f32; 3] = [0.68, 0.85, 0.9];

const HEADING_SIZE: f32 = 18.0;
const ENTRY_SIZE: f32 = 11.0;
const ENTRY_LEADING: f32 = 16.0;
/// Room below the heading before the first entry.
const HEADING_GAP: f32 = 30.0;
/// Entries stay clear of the page number.
const BOTTOM_RESERVE: f32 = 20.0;

/// A page's media box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PageBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl PageBox {
    pub(crate) const A4: Self = Self { x0: 0.0, y0: 0.0, x1: 595.0, y1: 842.0 };

    fn width(&self) -> f32 {
        self.x1 - self.x0
    }
}

fn real(value: f32) -> Object {
    Object::Real(value.into())
}

fn op(operator: &str, operands: Vec<Object>) -> Operation {
    Operation::new(operator, operands)
}

fn gray_fill(level: f32) -> Operation {
    op("g", vec![real(level)])
}

fn text(font: Font, size: f32, x: f32, y: f32, content: &str) -> Vec<Operation> {
    vec![
        op("BT", vec![]),
        op("Tf", vec![Object::Name(font.resource.as_bytes().to_vec()), real(size)]),
        op("Td", vec![real(x), real(y)]),
        op("Tj", vec![Object::string_literal(fonts::encode(content))]),
        op("ET", vec![]),
    ]
}

/// Centered page number at the bottom of the page.
pub(crate) fn footer(page: PageBox, number: u32) -> Vec<Operation> {
    let label = number.to_string();
    let x = page.x0 + (page.width() - REGULAR.width(&label, FOOTER_SIZE)) / 2.0;
    let mut ops = vec![gray_fill(0.0)];
    ops.extend(text(REGULAR, FOOTER_SIZE, x, page.y0 + FOOTER_OFFSET, &label));
    ops
}

/// The title of the song a continuation page belongs to, at the outer edge
/// (right on odd pages, left on even ones), above a thin rule.
pub(crate) fn running_header(page: PageBox, number: u32, title: &str) -> Vec<Operation> {
    let inner = page.width() - 2.0 * MARGIN;
    let title = REGULAR.truncate(title, HEADER_SIZE, inner);
    let y = page.y1 - HEADER_OFFSET;
    let x = if number % 2 == 1 {
        page.x1 - MARGIN - REGULAR.width(&title, HEADER_SIZE)
    } else {
        page.x0 + MARGIN
    };
    let mut ops = vec![op("q", vec![]), gray_fill(GRAY)];
    ops.extend(text(REGULAR, HEADER_SIZE, x, y, &title));
    ops.extend([
        op("G", vec![real(GRAY)]),
        op("w", vec![real(0.5)]),
        op("m", vec![real(page.x0 + MARGIN), real(y - 4.0)]),
        op("l", vec![real(page.x1 - MARGIN), real(y - 4.0)]),
        op("S", vec![]),
        op("Q", vec![]),
    ]);
    ops
}

/// A rounded, dashed, light blue box in the top right corner holding `id`.
/// Further songs starting on the same page get their badges stacked below,
/// one `slot` each.
pub(crate) fn badge(page: PageBox, id: &str, slot: usize) -> Vec<Operation> {
    let (w, h, r) = (BADGE_WIDTH, BADGE_HEIGHT, BADGE_RADIUS);
    let x = page.x1 - BADGE_RIGHT - w;
    let y = page.y1 - BADGE_TOP - h - slot as f32 * (h + BADGE_GAP);
    // Bezier control distance approximating a quarter circle.
    let k = 0.5523 * r;
    let point = |px: f32, py: f32| vec![real(px), real(py)];
    let curve = |a: (f32, f32), b: (f32, f32), c: (f32, f32)| {
        op("c", vec![real(a.0), real(a.1), real(b.0), real(b.1), real(c.0), real(c.1)])
    };

    let mut ops = vec![
        op("q", vec![]),
        op("rg", BADGE_FILL.iter().copied().map(real).collect()),
        op("RG", vec![real(0.0), real(0.0), real(0.0)]),
        op("w", vec![real(2.0)]),
        op("d", vec![Object::Array(vec![real(6.0), real(3.0)]), real(0.0)]),
        op("m", point(x + r, y)),
        op("l", point(x + w - r, y)),
        curve((x + w - r + k, y), (x + w, y + r - k), (x + w, y + r)),
        op("l", point(x + w, y + h - r)),
        curve((x + w, y + h - r + k), (x + w - r + k, y + h), (x + w - r, y + h)),
        op("l", point(x + r, y + h)),
        curve((x + r - k, y + h), (x, y + h - r + k), (x, y + h - r)),
        op("l", point(x, y + r)),
        curve((x, y + r - k), (x + r - k, y), (x + r, y)),
        op("h", vec![]),
        op("B", vec![]),
        op("Q", vec![]),
    ];

    let mut size = BADGE_SIZE;
    while size > 8.0 && BOLD.width(id, size) > w - 2.0 * BADGE_PADDING {
        size -= 1.0;
    }
    let text_x = x + (w - BOLD.width(id, size)) / 2.0;
    // Cap height of Helvetica is about 0.72 em.
    let text_y = y + (h - 0.72 * size) / 2.0;
    ops.push(gray_fill(0.0));
    ops.extend(text(BOLD, size, text_x, text_y, id));
    ops
}

/// One line of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexLine {
    pub title: String,
    pub page: u32,
}

/// Lay the index out over as many pages as it needs. The heading only goes
/// on the first one.
pub(crate) fn index_pages(page: PageBox, heading: &str, lines: &[IndexLine]) -> Vec<Vec<Operation>> {
    let top = page.y1 - MARGIN;
    let bottom = page.y0 + MARGIN + BOTTOM_RESERVE;
    let left = page.x0 + MARGIN;
    let right = page.x1 - MARGIN;

    let mut pages = Vec::new();
    let mut ops = vec![gray_fill(0.0)];
    ops.extend(text(BOLD, HEADING_SIZE, left, top - HEADING_SIZE, heading));
    let mut y = top - HEADING_SIZE - HEADING_GAP;
    for line in lines {
        if y < bottom {
            pages.push(std::mem::replace(&mut ops, vec![gray_fill(0.0)]));
            y = top - ENTRY_SIZE;
        }
        ops.extend(entry(left, right, y, line));
        y -= ENTRY_LEADING;
    }
    pages.push(ops);
    pages
}

fn entry(left: f32, right: f32, y: f32, line: &IndexLine) -> Vec<Operation> {
    let number = line.page.to_string();
    let number_width = REGULAR.width(&number, ENTRY_SIZE);
    let number_x = right - number_width;
    let title = REGULAR.truncate(&line.title, ENTRY_SIZE, (number_x - left - 24.0).max(0.0));
    let title_end = left + REGULAR.width(&title, ENTRY_SIZE);

    let mut ops = text(REGULAR, ENTRY_SIZE, left, y, &title);
    if number_x - title_end > 12.0 {
        ops.extend([
            op("q", vec![]),
            op("G", vec![real(GRAY)]),
            op("w", vec![real(0.8)]),
            op("J", vec![Object::Integer(1)]),
            op("d", vec![Object::Array(vec![real(0.0), real(3.0)]), real(0.0)]),
            op("m", vec![real(title_end + 4.0), real(y + 2.0)]),
            op("l", vec![real(number_x - 4.0), real(y + 2.0)]),
            op("S", vec![]),
            op("Q", vec![]),
        ]);
    }
    ops.extend(text(REGULAR, ENTRY_SIZE, number_x, y, &number));
    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shown(ops: &[Operation]) -> Vec<Vec<u8>> {
        ops.iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| match op.operands.first() {
                Some(Object::String(bytes, _)) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    fn lines(count: usize) -> Vec<IndexLine> {
        (0..count).map(|i| IndexLine { title: format!("Song {i}"), page: i as u32 + 1 }).collect()
    }

    #[test]
    fn test_footer_is_centered() {
        let ops = footer(PageBox::A4, 7);
        assert_eq!(shown(&ops), vec![b"7".to_vec()]);
        let td = ops.iter().find(|op| op.operator == "Td").unwrap();
        let x = match td.operands[0] {
            Object::Real(x) => x,
            _ => panic!("expected a real"),
        };
        assert!((f32::from(x) + REGULAR.width("7", FOOTER_SIZE) / 2.0 - 297.5).abs() < 0.01);
    }

    #[test]
    fn test_header_side_alternates() {
        let x_of = |ops: Vec<Operation>| match ops.iter().find(|op| op.operator == "Td").unwrap().operands[0] {
            Object::Real(x) => f32::from(x),
            _ => panic!("expected a real"),
        };
        let odd = x_of(running_header(PageBox::A4, 3, "Barka"));
        let even = x_of(running_header(PageBox::A4, 4, "Barka"));
        assert!(odd > 297.5);
        assert_eq!(even, MARGIN);
    }

    #[test]
    fn test_badge_shrinks_long_ids() {
        let size_of = |ops: Vec<Operation>| {
            ops.iter()
                .filter(|op| op.operator == "Tf")
                .find_map(|op| match op.operands[1] {
                    Object::Real(size) => Some(f32::from(size)),
                    _ => None,
                })
                .unwrap()
        };
        assert_eq!(size_of(badge(PageBox::A4, "A-001", 0)), BADGE_SIZE);
        assert!(size_of(badge(PageBox::A4, "WWWW-00001", 0)) < BADGE_SIZE);
    }

    #[test]
    fn test_badges_stack() {
        let start_y = |ops: Vec<Operation>| match ops.iter().find(|op| op.operator == "m").unwrap().operands[1] {
            Object::Real(y) => f32::from(y),
            _ => panic!("expected a real"),
        };
        let first = start_y(badge(PageBox::A4, "A-001", 0));
        let second = start_y(badge(PageBox::A4, "B-001", 1));
        assert_eq!(first, 842.0 - BADGE_TOP - BADGE_HEIGHT);
        assert_eq!(first - second, BADGE_HEIGHT + BADGE_GAP);
    }

    #[test]
    fn test_index_paginates() {
        assert_eq!(index_pages(PageBox::A4, "Index", &lines(3)).len(), 1);
        let pages = index_pages(PageBox::A4, "Index", &lines(120));
        assert!(pages.len() > 1);
        let total: usize = pages.iter().map(|ops| shown(ops).len()).sum();
        // Heading, then a title and a page number per entry.
        assert_eq!(total, 1 + 2 * 120);
        assert_eq!(shown(&pages[0])[0], b"Index".to_vec());
    }

    #[test]
    fn test_index_entry_text() {
        let pages = index_pages(PageBox::A4, "Obsah", &[IndexLine { title: "Barka".to_string(), page: 12 }]);
        assert_eq!(shown(&pages[0]), vec![b"Obsah".to_vec(), b"Barka".to_vec(), b"12".to_vec()]);
    }
}
