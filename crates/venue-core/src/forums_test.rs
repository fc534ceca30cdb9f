use std::path::Path;

use super::*;

fn rank(name: &str, allowed: bool, bonus_percentage: u32) -> RankConfig {
    RankConfig {
        name: name.to_string(),
        allowed,
        bonus_percentage,
    }
}

fn signature(name: &str, ranks: &[&str]) -> SignatureConfig {
    SignatureConfig {
        name: name.to_string(),
        code: "[url=https://venue.example]Venue[/url]".to_string(),
        test_signature: None,
        ranks: ranks.iter().map(|r| (*r).to_string()).collect(),
        active: true,
    }
}

fn site(name: &str) -> ForumSiteConfig {
    ForumSiteConfig {
        name: name.to_string(),
        address: "https://bitcointalk.org".to_string(),
        scraper: ScraperKind::Bitcointalk,
        ranks: vec![rank("Member", true, 0), rank("Hero Member", true, 20)],
        signatures: vec![signature("Gold", &["Member", "Hero Member"])],
    }
}

#[test]
fn scraper_kind_parses_known_adapters() {
    assert_eq!("bitcointalk".parse::<ScraperKind>().unwrap(), ScraperKind::Bitcointalk);
    assert_eq!(
        "bitcoin_forum".parse::<ScraperKind>().unwrap(),
        ScraperKind::BitcoinForum
    );
}

#[test]
fn scraper_kind_rejects_unknown_adapter() {
    let err = "reddit".parse::<ScraperKind>().unwrap_err();
    assert!(matches!(err, CoreError::UnknownScraper(ref s) if s == "reddit"));
}

#[test]
fn scraper_kind_display_matches_parse() {
    for kind in [ScraperKind::Bitcointalk, ScraperKind::BitcoinForum] {
        assert_eq!(kind.to_string().parse::<ScraperKind>().unwrap(), kind);
    }
}

#[test]
fn validate_accepts_valid_sites() {
    let forums_file = ForumsFile {
        sites: vec![site("bitcointalk.org")],
    };
    assert!(validate_forums(&forums_file).is_ok());
}

#[test]
fn validate_rejects_empty_site_name() {
    let forums_file = ForumsFile {
        sites: vec![site("  ")],
    };
    let err = validate_forums(&forums_file).unwrap_err();
    assert!(err.to_string().contains("non-empty"));
}

#[test]
fn validate_rejects_duplicate_site_case_insensitively() {
    let forums_file = ForumsFile {
        sites: vec![site("Bitcointalk"), site("bitcointalk")],
    };
    let err = validate_forums(&forums_file).unwrap_err();
    assert!(err.to_string().contains("duplicate forum site"));
}

#[test]
fn validate_rejects_relative_address() {
    let mut bad = site("bitcointalk.org");
    bad.address = "bitcointalk.org".to_string();
    let err = validate_forums(&ForumsFile { sites: vec![bad] }).unwrap_err();
    assert!(err.to_string().contains("invalid address"));
}

#[test]
fn validate_rejects_oversized_bonus() {
    let mut bad = site("bitcointalk.org");
    bad.ranks.push(rank("Legendary", true, 150));
    let err = validate_forums(&ForumsFile { sites: vec![bad] }).unwrap_err();
    assert!(err.to_string().contains("bonus 150%"));
}

#[test]
fn validate_rejects_duplicate_rank() {
    let mut bad = site("bitcointalk.org");
    bad.ranks.push(rank("Member", false, 0));
    let err = validate_forums(&ForumsFile { sites: vec![bad] }).unwrap_err();
    assert!(err.to_string().contains("duplicate rank 'Member'"));
}

#[test]
fn validate_rejects_signature_for_unknown_rank() {
    let mut bad = site("bitcointalk.org");
    bad.signatures.push(signature("Silver", &["Newbie"]));
    let err = validate_forums(&ForumsFile { sites: vec![bad] }).unwrap_err();
    assert!(err.to_string().contains("unknown rank 'Newbie'"));
}

#[test]
fn validate_rejects_duplicate_signature() {
    let mut bad = site("bitcointalk.org");
    bad.signatures.push(signature("Gold", &[]));
    let err = validate_forums(&ForumsFile { sites: vec![bad] }).unwrap_err();
    assert!(err.to_string().contains("duplicate signature 'Gold'"));
}

#[test]
fn rank_lookup_by_name() {
    let site = site("bitcointalk.org");
    assert_eq!(site.rank("Hero Member").map(|r| r.bonus_percentage), Some(20));
    assert!(site.rank("Nobody").is_none());
}

#[test]
fn parses_yaml_with_defaults() {
    let yaml = r#"
sites:
  - name: forum.bitcoin.com
    address: https://forum.bitcoin.com
    scraper: bitcoin_forum
    ranks:
      - name: Member
        allowed: true
      - name: Newbie
    signatures:
      - name: Basic
        code: "[url=https://venue.example]Join[/url]"
        ranks: [Member]
"#;
    let forums_file: ForumsFile = serde_yaml::from_str(yaml).unwrap();
    validate_forums(&forums_file).unwrap();
    let site = &forums_file.sites[0];
    assert_eq!(site.scraper, ScraperKind::BitcoinForum);
    assert!(site.ranks[0].allowed);
    assert!(!site.ranks[1].allowed);
    assert_eq!(site.ranks[1].bonus_percentage, 0);
    assert!(site.signatures[0].active);
    assert!(site.signatures[0].test_signature.is_none());
}

#[test]
fn load_forums_reports_missing_file() {
    let err = load_forums(Path::new("/definitely/not/here/forums.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::ForumsFileIo { .. }));
}

#[test]
fn load_forums_from_real_file() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("config")
        .join("forums.yaml");
    assert!(path.exists(), "forums.yaml missing at {path:?}");
    let result = load_forums(&path);
    assert!(result.is_ok(), "failed to load forums.yaml: {result:?}");
    let forums_file = result.unwrap();
    assert!(!forums_file.sites.is_empty());
}
