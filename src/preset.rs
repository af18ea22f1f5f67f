use crate::error::{FilesystemError, FsOperation, ParseError};
use log::{debug, warn};
use std::borrow::Cow;
use std::fmt::{Display, Formatter};
use std::fs::{read_dir, read_to_string};
use std::path::{Path, PathBuf};
use tl::{HTMLTag, NodeHandle, Parser};
use url::Url;

const MOD_CONTAINER: &str = "ModContainer";
const DISPLAY_NAME: &str = "DisplayName";
const LINK: &str = "Link";
const PRESET_NAME_META: &str = "arma:PresetName";

/// The launcher writes this into the generator meta tag and a leading comment.
pub const LAUNCHER_MARKER: &str = "Arma 3 Launcher";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModDescriptor {
    pub name: String,
    pub workshop_id: String,
    pub link: String,
    pub local_path: Option<PathBuf>,
}

impl ModDescriptor {
    pub fn new(name: impl Into<String>, workshop_id: impl Into<String>, link: impl Into<String>) -> Self {
        ModDescriptor {
            name: name.into(),
            workshop_id: workshop_id.into(),
            link: link.into(),
            local_path: None,
        }
    }

    pub fn with_local_path(&self, path: PathBuf) -> Self {
        ModDescriptor { local_path: Some(path), ..self.clone() }
    }
}

/// Mods in load order, exactly as listed in the export.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModPreset {
    pub name: Option<String>,
    pub mods: Vec<ModDescriptor>,
}

#[derive(Debug)]
pub struct ParsedPreset {
    pub preset: ModPreset,
    pub warnings: Vec<EntryWarning>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryProblem {
    MissingLink,
    MalformedLink(String),
    MissingId(String),
    MalformedId(String),
}

impl Display for EntryProblem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryProblem::MissingLink => f.write_str("no workshop link (local mod?)"),
            EntryProblem::MalformedLink(link) => write!(f, "malformed link \"{}\"", link),
            EntryProblem::MissingId(link) => write!(f, "link \"{}\" has no id parameter", link),
            EntryProblem::MalformedId(id) => write!(f, "\"{}\" is not a workshop id", id),
        }
    }
}

/// An entry that was skipped while parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryWarning {
    /// 1-based position among the document's mod entries.
    pub position: usize,
    pub name: Option<String>,
    pub problem: EntryProblem,
}

impl Display for EntryWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "#{} \"{}\": {}", self.position, name, self.problem),
            None => write!(f, "#{}: {}", self.position, self.problem),
        }
    }
}

pub fn is_launcher_preset(text: &str) -> bool {
    text.contains(LAUNCHER_MARKER)
}

pub fn read_preset<P: AsRef<Path>>(path: P) -> Result<ParsedPreset, ParseError> {
    let path = path.as_ref();
    let text = read_to_string(path).map_err(|source| ParseError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    debug!("Parsing preset {}", path.display());
    parse_preset(&text)
}

pub fn parse_preset(text: &str) -> Result<ParsedPreset, ParseError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let dom = tl::parse(text, tl::ParserOptions::default())
        .map_err(|err| ParseError::Html(err.to_string()))?;
    let parser = dom.parser();

    let mut containers = Vec::new();
    let mut name = None;
    walk(dom.children(), parser, &mut |tag| {
        if attribute(tag, "data-type").as_deref() == Some(MOD_CONTAINER) {
            containers.push(tag);
            return false;
        }
        if name.is_none() && tag.name().as_utf8_str().eq_ignore_ascii_case("meta")
            && attribute(tag, "name").as_deref() == Some(PRESET_NAME_META)
        {
            name = attribute(tag, "content")
                .map(|content| decode_entities(content.trim()))
                .filter(|content| !content.is_empty());
        }
        true
    });

    if containers.is_empty() {
        return Err(ParseError::NoEntries);
    }

    let mut mods = Vec::with_capacity(containers.len());
    let mut warnings = Vec::new();

    for (index, container) in containers.into_iter().enumerate() {
        match read_entry(container, parser) {
            Ok(descriptor) => mods.push(descriptor),
            Err((name, problem)) => {
                let warning = EntryWarning { position: index + 1, name, problem };
                warn!("Skipping preset entry {}", warning);
                warnings.push(warning);
            }
        }
    }

    if mods.is_empty() {
        return Err(ParseError::NoValidEntries { skipped: warnings.len() });
    }

    Ok(ParsedPreset {
        preset: ModPreset { name, mods },
        warnings,
    })
}

fn read_entry(container: &HTMLTag<'_>, parser: &Parser<'_>) -> Result<ModDescriptor, (Option<String>, EntryProblem)> {
    let mut name = None;
    let mut link = None;

    walk(&child_handles(container), parser, &mut |tag| {
        match attribute(tag, "data-type").as_deref() {
            Some(DISPLAY_NAME) if name.is_none() => {
                let text = decode_entities(tag.inner_text(parser).trim());
                if !text.is_empty() {
                    name = Some(text);
                }
                false
            }
            Some(LINK) if link.is_none() => {
                let href = attribute(tag, "href").filter(|href| !href.trim().is_empty());
                let raw = match href {
                    Some(href) => href.trim().to_string(),
                    None => tag.inner_text(parser).trim().to_string(),
                };
                link = Some(decode_entities(&raw));
                false
            }
            _ => true,
        }
    });

    let Some(link) = link.filter(|link| !link.is_empty()) else {
        return Err((name, EntryProblem::MissingLink));
    };

    match workshop_id(&link) {
        Ok(id) => Ok(ModDescriptor::new(name.unwrap_or_else(|| id.clone()), id, link)),
        Err(problem) => Err((name, problem)),
    }
}

fn workshop_id(link: &str) -> Result<String, EntryProblem> {
    let url = Url::parse(link).map_err(|_| EntryProblem::MalformedLink(link.to_string()))?;

    let id = url.query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.trim().to_string())
        .ok_or_else(|| EntryProblem::MissingId(link.to_string()))?;

    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EntryProblem::MalformedId(id));
    }

    Ok(id)
}

/// Depth-first, document-order walk. `visit` returns whether to descend.
fn walk<'p, 'buf>(handles: &[NodeHandle], parser: &'p Parser<'buf>, visit: &mut dyn FnMut(&'p HTMLTag<'buf>) -> bool) {
    for handle in handles {
        let Some(tag) = handle.get(parser).and_then(|node| node.as_tag()) else {
            continue
        };

        if visit(tag) {
            walk(&child_handles(tag), parser, visit);
        }
    }
}

fn child_handles(tag: &HTMLTag<'_>) -> Vec<NodeHandle> {
    tag.children().top().iter().copied().collect()
}

fn attribute<'a>(tag: &'a HTMLTag<'_>, key: &'static str) -> Option<Cow<'a, str>> {
    tag.attributes().get(key).flatten().map(|value| value.as_utf8_str())
}

fn decode_entities(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        result.push_str(&rest[..start]);
        rest = &rest[start..];

        let decoded = rest.find(';').and_then(|end| {
            let entity = &rest[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity.strip_prefix('#').and_then(|num| {
                    match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => num.parse().ok(),
                    }
                }).and_then(char::from_u32),
            };
            ch.map(|ch| (ch, end))
        });

        match decoded {
            Some((ch, end)) => {
                result.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                result.push('&');
                rest = &rest[1..];
            }
        }
    }

    result.push_str(rest);
    result
}

/// Launcher exports among the `.html` files of `dir`, sorted by path.
pub fn discover_presets<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>, FilesystemError> {
    let dir = dir.as_ref();
    let mut result = Vec::new();

    let entries = read_dir(dir).map_err(|err| FilesystemError::new(FsOperation::Read, dir, err))?;
    for entry in entries {
        let path = entry.map_err(|err| FilesystemError::new(FsOperation::Read, dir, err))?.path();

        let is_html = path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("html"));
        if !is_html || !path.is_file() {
            continue
        }

        match read_to_string(&path) {
            Ok(text) if is_launcher_preset(&text) => result.push(path),
            Ok(_) => debug!("{} is not a launcher preset", path.display()),
            Err(err) => warn!("Failed to read {}: {}", path.display(), err),
        }
    }

    result.sort();
    Ok(result)
}

/// First preset whose file name contains `query`.
pub fn select_preset<'a>(presets: &'a [PathBuf], query: &str) -> Option<&'a PathBuf> {
    if query.is_empty() {
        return None;
    }

    presets.iter().find(|preset| {
        preset.file_name()
            .map(|name| name.to_string_lossy().contains(query))
            .unwrap_or(false)
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs::write;
    use tempfile::tempdir;

    fn row(name: &str, link: &str) -> String {
        format!(r#"        <tr data-type="ModContainer">
          <td data-type="DisplayName">{name}</td>
          <td>
            <span class="from-steam">Steam</span>
          </td>
          <td>
            <a href="{link}" data-type="Link">{link}</a>
          </td>
        </tr>
"#)
    }

    fn steam_row(name: &str, id: &str) -> String {
        row(name, &format!("https://steamcommunity.com/sharedfiles/filedetails/?id={id}"))
    }

    pub(crate) fn document(rows: &[String]) -> String {
        format!(r#"<?xml version="1.0" encoding="utf-8"?>
<html>
  <!--Created by Arma 3 Launcher: https://arma3.com-->
  <head>
    <meta name="arma:Type" content="preset" />
    <meta name="arma:PresetName" content="Ops Night" />
    <meta name="generator" content="Arma 3 Launcher - https://arma3.com" />
    <title>Arma 3</title>
  </head>
  <body>
    <h1>Arma 3  - Preset <strong>Ops Night</strong></h1>
    <div class="mod-list">
      <table>
{}      </table>
    </div>
    <div class="dlc-list">
      <table>
        <tr data-type="DlcContainer">
          <td data-type="DisplayName">Apex</td>
          <td><a href="https://store.steampowered.com/app/395180" data-type="Link">https://store.steampowered.com/app/395180</a></td>
        </tr>
      </table>
    </div>
  </body>
</html>
"#, rows.concat())
    }

    pub(crate) fn preset_of(mods: &[(&str, &str)]) -> String {
        let rows: Vec<String> = mods.iter().map(|(name, id)| steam_row(name, id)).collect();
        document(&rows)
    }

    fn ids(preset: &ModPreset) -> Vec<&str> {
        preset.mods.iter().map(|m| m.workshop_id.as_str()).collect()
    }

    #[test]
    fn parses_entries_in_document_order() {
        let parsed = parse_preset(&preset_of(&[("CBA_A3", "450814997"), ("ace", "463939057"), ("RHSAFRF", "843425103")])).unwrap();

        assert_eq!(ids(&parsed.preset), vec!["450814997", "463939057", "843425103"]);
        assert_eq!(parsed.preset.mods[0].name, "CBA_A3");
        assert_eq!(parsed.preset.mods[1].link, "https://steamcommunity.com/sharedfiles/filedetails/?id=463939057");
        assert_eq!(parsed.preset.name.as_deref(), Some("Ops Night"));
        assert!(parsed.preset.mods.iter().all(|m| m.local_path.is_none()));
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn keeps_duplicate_entries() {
        let parsed = parse_preset(&preset_of(&[("A", "111"), ("B", "222"), ("A", "111")])).unwrap();
        assert_eq!(ids(&parsed.preset), vec!["111", "222", "111"]);
    }

    #[test]
    fn ignores_dlc_rows() {
        let parsed = parse_preset(&preset_of(&[("A", "111")])).unwrap();
        assert_eq!(parsed.preset.mods.len(), 1);
    }

    #[test]
    fn document_without_entries_is_an_error() {
        let html = "<html><head><title>Arma 3 Launcher</title></head><body><p>nothing here</p></body></html>";
        assert!(matches!(parse_preset(html), Err(ParseError::NoEntries)));
        assert!(matches!(parse_preset(""), Err(ParseError::NoEntries)));
    }

    #[test]
    fn malformed_entries_are_skipped_with_warnings() {
        let local = r#"        <tr data-type="ModContainer">
          <td data-type="DisplayName">My Local Mod</td>
          <td><span class="from-local">Local</span></td>
          <td></td>
        </tr>
"#.to_string();
        let rows = vec![
            steam_row("A", "111"),
            local,
            row("Broken", "https://steamcommunity.com/sharedfiles/filedetails/?id=12ab"),
            row("NoId", "https://steamcommunity.com/sharedfiles/filedetails/"),
            steam_row("B", "222"),
        ];

        let parsed = parse_preset(&document(&rows)).unwrap();

        assert_eq!(ids(&parsed.preset), vec!["111", "222"]);
        assert_eq!(parsed.warnings.len(), 3);
        assert_eq!(parsed.warnings[0].position, 2);
        assert_eq!(parsed.warnings[0].name.as_deref(), Some("My Local Mod"));
        assert_eq!(parsed.warnings[0].problem, EntryProblem::MissingLink);
        assert_eq!(parsed.warnings[1].problem, EntryProblem::MalformedId("12ab".to_string()));
        assert!(matches!(parsed.warnings[2].problem, EntryProblem::MissingId(_)));
    }

    #[test]
    fn only_malformed_entries_is_an_error() {
        let rows = vec![row("Broken", "not a link")];
        match parse_preset(&document(&rows)) {
            Err(ParseError::NoValidEntries { skipped }) => assert_eq!(skipped, 1),
            other => panic!("unexpected result: {:?}", other.map(|p| p.preset)),
        }
    }

    #[test]
    fn decodes_entities_in_names_and_links() {
        let rows = vec![row("Tom &amp; Jerry&#39;s &lt;Mod&gt;", "https://steamcommunity.com/sharedfiles/filedetails/?id=333&amp;searchtext=")];
        let parsed = parse_preset(&document(&rows)).unwrap();

        assert_eq!(parsed.preset.mods[0].name, "Tom & Jerry's <Mod>");
        assert_eq!(parsed.preset.mods[0].workshop_id, "333");
    }

    #[test]
    fn entity_decoding_leaves_bare_ampersands() {
        assert_eq!(decode_entities("a & b &unknown; &#x41;"), "a & b &unknown; A");
    }

    #[test]
    fn tolerates_byte_order_mark() {
        let text = format!("\u{feff}{}", preset_of(&[("A", "111")]));
        assert_eq!(ids(&parse_preset(&text).unwrap().preset), vec!["111"]);
    }

    #[test]
    fn read_preset_reports_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(read_preset(dir.path().join("missing.html")), Err(ParseError::Unreadable { .. })));
    }

    #[test]
    fn discovers_only_launcher_exports() {
        let dir = tempdir().unwrap();
        write(dir.path().join("b_preset.html"), preset_of(&[("A", "111")])).unwrap();
        write(dir.path().join("a_preset.HTML"), preset_of(&[("B", "222")])).unwrap();
        write(dir.path().join("readme.html"), "<html><body>hello</body></html>").unwrap();
        write(dir.path().join("notes.txt"), LAUNCHER_MARKER).unwrap();

        let found = discover_presets(dir.path()).unwrap();
        let names: Vec<String> = found.iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["a_preset.HTML", "b_preset.html"]);
    }

    #[test]
    fn selects_preset_by_name_fragment() {
        let presets = vec![PathBuf::from("ServerProfiles/Ops Night.html"), PathBuf::from("ServerProfiles/Training.html")];

        assert_eq!(select_preset(&presets, "Train"), Some(&presets[1]));
        assert_eq!(select_preset(&presets, "train"), None);
        assert_eq!(select_preset(&presets, ""), None);
    }
}
