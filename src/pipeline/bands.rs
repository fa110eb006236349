//! Band location and token classification.
//!
//! The band locator derives column regions from header-row tokens: the first
//! line whose tokens match aliases for enough of the expected fields, in
//! left-to-right order, locks one band per matched field. The token
//! classifier then assigns every token below the header to the band with
//! maximal horizontal overlap. Both are pure functions of their inputs.

use crate::core::config::ExtractionConfig;
use crate::domain::{Band, BandedToken, FieldKind, Token};
use crate::processors::{HSpan, VSpan};

/// The per-page output of band location: one band per matched field,
/// ordered left-to-right, plus the header line's vertical extent (tokens at
/// or above the header are not row material).
#[derive(Debug, Clone, PartialEq)]
pub struct BandLayout {
    /// Bands ordered left-to-right.
    pub bands: Vec<Band>,
    /// Vertical extent of the header line.
    pub header_v: VSpan,
}

/// Lowercases, trims, and strips a trailing colon so that header cells like
/// "Qty:" match the alias "qty".
fn normalize_header_text(text: &str) -> String {
    text.trim().trim_end_matches(':').to_lowercase()
}

/// Groups tokens into raw lines by vertical-center proximity. Tokens are
/// sorted by center first, so each cluster is a maximal chain.
fn raw_lines(tokens: &[Token], tolerance: f32) -> Vec<Vec<&Token>> {
    let mut sorted: Vec<&Token> = tokens.iter().collect();
    sorted.sort_by(|a, b| {
        a.v_center()
            .total_cmp(&b.v_center())
            .then(a.x0.total_cmp(&b.x0))
    });

    let mut lines: Vec<Vec<&Token>> = Vec::new();
    let mut last_center = f32::NEG_INFINITY;
    for token in sorted {
        let center = token.v_center();
        if (center - last_center).abs() < tolerance
            && let Some(current) = lines.last_mut()
        {
            current.push(token);
        } else {
            lines.push(vec![token]);
        }
        last_center = center;
    }
    for line in &mut lines {
        line.sort_by(|a, b| a.x0.total_cmp(&b.x0));
    }
    lines
}

/// One alias hit on a candidate header line.
struct HeaderMatch {
    field: FieldKind,
    span: HSpan,
}

/// Tries to match the configured fields against one raw line. A field
/// matches on a single token or on two adjacent tokens joined with a space
/// ("unit" + "price"). A token matched by an earlier field is consumed and
/// never re-matched, so "Unit | Price" cannot yield a unit-price pair
/// starting on the unit-of-measure cell. Returns matches ordered by the
/// configured field order, or None when too few fields matched or the
/// matches are not left-to-right.
fn match_header_line(line: &[&Token], config: &ExtractionConfig) -> Option<Vec<HeaderMatch>> {
    let normalized: Vec<String> = line
        .iter()
        .map(|t| normalize_header_text(&t.text))
        .collect();

    let mut used = vec![false; line.len()];
    let mut matches = Vec::new();
    for spec in &config.fields {
        let mut hit: Option<HSpan> = None;
        for (i, norm) in normalized.iter().enumerate() {
            if used[i] {
                continue;
            }
            let single = config
                .aliases(spec.kind)
                .iter()
                .any(|a| a.eq_ignore_ascii_case(norm));
            if single {
                hit = Some(line[i].h_span());
                used[i] = true;
                break;
            }
            if i + 1 < normalized.len() && !used[i + 1] {
                let joined = format!("{} {}", norm, normalized[i + 1]);
                let pair = config
                    .aliases(spec.kind)
                    .iter()
                    .any(|a| a.eq_ignore_ascii_case(&joined));
                if pair {
                    hit = Some(HSpan::new(line[i].x0, line[i + 1].x1));
                    used[i] = true;
                    used[i + 1] = true;
                    break;
                }
            }
        }
        if let Some(span) = hit {
            matches.push(HeaderMatch {
                field: spec.kind,
                span,
            });
        }
    }

    if matches.len() < config.effective_min_header_matches() {
        return None;
    }
    // Left-to-right order across the configured field sequence.
    let in_order = matches.windows(2).all(|w| w[0].span.x0 < w[1].span.x0);
    if !in_order {
        return None;
    }
    Some(matches)
}

/// Locates bands from the header line, or None when no line matches enough
/// fields (the page is then flagged "no-bands" by the driver and excluded).
pub fn locate_bands(tokens: &[Token], config: &ExtractionConfig) -> Option<BandLayout> {
    if tokens.is_empty() {
        return None;
    }
    let page_x0 = tokens.iter().map(|t| t.x0).fold(f32::INFINITY, f32::min);
    let page_x1 = tokens.iter().map(|t| t.x1).fold(f32::NEG_INFINITY, f32::max);

    for line in raw_lines(tokens, config.header_line_tolerance) {
        let Some(matches) = match_header_line(&line, config) else {
            continue;
        };

        let header_v = line
            .iter()
            .map(|t| t.v_span())
            .reduce(|a, b| a.union(&b))
            .unwrap_or(VSpan::new(0.0, 0.0));

        // Extend each band halfway to its neighbors; the outermost bands
        // reach the page's token extremes.
        let bands: Vec<Band> = matches
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let left = if i == 0 {
                    page_x0.min(m.span.x0)
                } else {
                    (matches[i - 1].span.x1 + m.span.x0) / 2.0
                };
                let right = if i == matches.len() - 1 {
                    page_x1.max(m.span.x1)
                } else {
                    (m.span.x1 + matches[i + 1].span.x0) / 2.0
                };
                Band {
                    field: m.field,
                    span: HSpan::new(left, right),
                }
            })
            .collect();

        tracing::debug!(
            target: "bands",
            matched = bands.len(),
            fields = ?bands.iter().map(|b| b.field).collect::<Vec<_>>(),
            header_top = header_v.top,
            "locked bands from header line"
        );
        return Some(BandLayout { bands, header_v });
    }

    tracing::debug!(target: "bands", "no header line matched enough fields");
    None
}

/// Assigns every token below the header to the band with maximal horizontal
/// overlap; ties break to the leftmost band, zero-overlap tokens are
/// discarded. Output is sorted by (vertical center, left edge) so later
/// stages iterate deterministically.
pub fn classify_tokens(tokens: &[Token], layout: &BandLayout) -> Vec<BandedToken> {
    let mut banded: Vec<BandedToken> = tokens
        .iter()
        .filter(|t| t.v_center() > layout.header_v.bottom)
        .filter_map(|token| {
            let h = token.h_span();
            let mut best: Option<(f32, &Band)> = None;
            for band in &layout.bands {
                let overlap = band.span.overlap_len(&h);
                if overlap <= 0.0 {
                    continue;
                }
                // Strict greater-than keeps the leftmost band on ties.
                match best {
                    Some((best_overlap, _)) if overlap <= best_overlap => {}
                    _ => best = Some((overlap, band)),
                }
            }
            best.map(|(_, band)| BandedToken {
                field: band.field,
                text: token.text.clone(),
                h,
                v: token.v_span(),
            })
        })
        .collect();

    banded.sort_by(|a, b| {
        a.v.center()
            .total_cmp(&b.v.center())
            .then(a.h.x0.total_cmp(&b.h.x0))
    });
    banded
}
