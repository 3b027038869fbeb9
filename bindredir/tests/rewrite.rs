//! End-to-end driver runs against a temporary directory tree, using a stub
//! identity source so no real PE images are needed.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bindredir::{
    rewrite_redirects, AssemblyIdentity, AssemblyVersion, Document, IdentityExtractor,
    MergeAction, NullReporter, Reporter, Result, ScanEvent, WIDE_OLD_VERSION,
};

/// Maps file names to canned identities; files not in the map behave like
/// native binaries (no identity).
struct StubExtractor {
    identities: HashMap<String, AssemblyIdentity>,
}

impl StubExtractor {
    fn new() -> Self {
        StubExtractor {
            identities: HashMap::new(),
        }
    }

    fn with(mut self, file: &str, identity: AssemblyIdentity) -> Self {
        self.identities.insert(file.to_string(), identity);
        self
    }
}

impl IdentityExtractor for StubExtractor {
    fn applies_to(&self, path: &Path) -> bool {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => ext.eq_ignore_ascii_case("dll") || ext.eq_ignore_ascii_case("exe"),
            None => false,
        }
    }

    fn extract(&self, path: &Path) -> Result<Option<AssemblyIdentity>> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        Ok(self.identities.get(name).cloned())
    }
}

fn signed(name: &str, version: AssemblyVersion, culture: Option<&str>) -> AssemblyIdentity {
    AssemblyIdentity {
        name: name.to_string(),
        version,
        culture: culture.map(str::to_string),
        public_key_token: Some([0x30, 0xAD, 0x4F, 0xE6, 0xB2, 0xA6, 0xAE, 0xED]),
    }
}

fn unsigned(name: &str) -> AssemblyIdentity {
    AssemblyIdentity {
        name: name.to_string(),
        version: AssemblyVersion::new(1, 0, 0, 0),
        culture: None,
        public_key_token: None,
    }
}

fn touch(dir: &Path, name: &str) {
    fs::write(dir.join(name), b"stub").unwrap();
}

fn entry_for<'d>(doc: &'d Document, name: &str) -> &'d bindredir::XmlElement {
    let runtime = doc.root.child_element("runtime").unwrap();
    let binding = runtime.child_element("assemblyBinding").unwrap();
    binding
        .elements()
        .find(|entry| {
            entry
                .child_element("assemblyIdentity")
                .and_then(|ident| ident.attr("name"))
                == Some(name)
        })
        .unwrap()
}

#[test]
fn fresh_config_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("bin");
    fs::create_dir_all(bin.join("plugins")).unwrap();
    touch(&bin, "Contoso.Core.dll");
    touch(&bin, "App.exe");
    touch(&bin, "native.dll");
    touch(&bin, "Unsigned.dll");
    touch(&bin, "readme.txt");
    touch(&bin.join("plugins"), "Contoso.Plugin.dll");

    let extractor = StubExtractor::new()
        .with(
            "Contoso.Core.dll",
            signed("Contoso.Core", AssemblyVersion::new(13, 0, 0, 0), None),
        )
        .with("App.exe", signed("App", AssemblyVersion::new(2, 1, 0, 0), None))
        .with("Unsigned.dll", unsigned("Unsigned"))
        .with(
            "Contoso.Plugin.dll",
            signed("Contoso.Plugin", AssemblyVersion::new(1, 5, 2, 0), None),
        );

    let config = dir.path().join("App.config");
    let summary = rewrite_redirects(&config, true, &bin, &extractor, &mut NullReporter).unwrap();

    assert_eq!(summary.scanned, 5);
    assert_eq!(summary.no_identity, 1);
    assert_eq!(summary.unsigned, 1);
    assert_eq!(summary.inserted, 3);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.kept, 0);

    let doc = Document::load(&config).unwrap();
    assert_eq!(doc.root.name, "configuration");

    let core = entry_for(&doc, "Contoso.Core");
    let ident = core.child_element("assemblyIdentity").unwrap();
    assert_eq!(ident.attr("publicKeyToken"), Some("30ad4fe6b2a6aeed"));
    assert_eq!(ident.attr("culture"), None);

    let redirect = core.child_element("bindingRedirect").unwrap();
    assert_eq!(redirect.attr("oldVersion"), Some(WIDE_OLD_VERSION));
    assert_eq!(redirect.attr("newVersion"), Some("13.0.0.0"));

    // The nested plugin was picked up by the recursive walk
    entry_for(&doc, "Contoso.Plugin");
}

#[test]
fn two_runs_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("bin");
    fs::create_dir(&bin).unwrap();
    touch(&bin, "Lib.dll");

    let extractor = StubExtractor::new().with(
        "Lib.dll",
        signed("Lib", AssemblyVersion::new(4, 2, 1, 0), None),
    );
    let config = dir.path().join("App.config");

    let first = rewrite_redirects(&config, false, &bin, &extractor, &mut NullReporter).unwrap();
    let after_first = fs::read_to_string(&config).unwrap();

    let second = rewrite_redirects(&config, false, &bin, &extractor, &mut NullReporter).unwrap();
    let after_second = fs::read_to_string(&config).unwrap();

    assert_eq!(first.inserted, 1);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 1);
    assert_eq!(after_first, after_second);
}

#[test]
fn keep_existing_preserves_manual_range() {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("bin");
    fs::create_dir(&bin).unwrap();
    touch(&bin, "Lib.dll");

    let config = dir.path().join("App.config");
    fs::write(
        &config,
        r#"<?xml version="1.0" encoding="utf-8"?>
<configuration>
  <runtime>
    <assemblyBinding xmlns="urn:schemas-microsoft-com:asm.v1">
      <dependentAssembly>
        <assemblyIdentity name="Lib" publicKeyToken="30ad4fe6b2a6aeed" />
        <bindingRedirect oldVersion="0.0.0.0-1.0.0.0" newVersion="1.0.0.0" />
      </dependentAssembly>
    </assemblyBinding>
  </runtime>
</configuration>"#,
    )
    .unwrap();

    let extractor = StubExtractor::new().with(
        "Lib.dll",
        signed("Lib", AssemblyVersion::new(2, 0, 0, 0), None),
    );

    let summary = rewrite_redirects(&config, true, &bin, &extractor, &mut NullReporter).unwrap();
    assert_eq!(summary.kept, 1);
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.updated, 0);

    let doc = Document::load(&config).unwrap();
    let redirect = entry_for(&doc, "Lib").child_element("bindingRedirect").unwrap();
    assert_eq!(redirect.attr("oldVersion"), Some("0.0.0.0-1.0.0.0"));
    assert_eq!(redirect.attr("newVersion"), Some("1.0.0.0"));
}

#[test]
fn overwrite_rewrites_manual_range() {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("bin");
    fs::create_dir(&bin).unwrap();
    touch(&bin, "Lib.dll");

    let config = dir.path().join("App.config");
    fs::write(
        &config,
        r#"<configuration>
  <runtime>
    <assemblyBinding xmlns="urn:schemas-microsoft-com:asm.v1">
      <dependentAssembly>
        <assemblyIdentity name="Lib" publicKeyToken="30ad4fe6b2a6aeed" />
        <bindingRedirect oldVersion="0.0.0.0-1.0.0.0" newVersion="1.0.0.0" />
      </dependentAssembly>
    </assemblyBinding>
  </runtime>
</configuration>"#,
    )
    .unwrap();

    let extractor = StubExtractor::new().with(
        "Lib.dll",
        signed("Lib", AssemblyVersion::new(2, 0, 0, 0), None),
    );

    let summary = rewrite_redirects(&config, false, &bin, &extractor, &mut NullReporter).unwrap();
    assert_eq!(summary.updated, 1);

    let doc = Document::load(&config).unwrap();
    let redirect = entry_for(&doc, "Lib").child_element("bindingRedirect").unwrap();
    assert_eq!(redirect.attr("oldVersion"), Some(WIDE_OLD_VERSION));
    assert_eq!(redirect.attr("newVersion"), Some("2.0.0.0"));
}

#[test]
fn unrelated_document_content_survives() {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("bin");
    fs::create_dir(&bin).unwrap();
    touch(&bin, "Lib.dll");

    let config = dir.path().join("App.config");
    fs::write(
        &config,
        r#"<?xml version="1.0" encoding="utf-8"?>
<configuration>
  <!-- deployment notes live here -->
  <appSettings>
    <add key="endpoint" value="https://example.test/?a=1&amp;b=2" />
  </appSettings>
  <runtime>
    <gcServer enabled="true" />
  </runtime>
</configuration>"#,
    )
    .unwrap();

    let extractor = StubExtractor::new().with(
        "Lib.dll",
        signed("Lib", AssemblyVersion::new(1, 0, 0, 0), None),
    );

    rewrite_redirects(&config, true, &bin, &extractor, &mut NullReporter).unwrap();

    let text = fs::read_to_string(&config).unwrap();
    assert!(text.contains("<!-- deployment notes live here -->"));
    assert!(text.contains("https://example.test/?a=1&amp;b=2"));
    assert!(text.contains("<gcServer enabled=\"true\"/>"));

    let doc = Document::load(&config).unwrap();
    entry_for(&doc, "Lib");
}

#[test]
fn cultures_get_separate_entries() {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("bin");
    fs::create_dir(&bin).unwrap();
    touch(&bin, "Lib.dll");
    touch(&bin, "Lib.resources.dll");

    let extractor = StubExtractor::new()
        .with(
            "Lib.dll",
            signed("Lib", AssemblyVersion::new(1, 0, 0, 0), None),
        )
        .with(
            "Lib.resources.dll",
            signed("Lib", AssemblyVersion::new(1, 0, 0, 0), Some("de-DE")),
        );

    let config = dir.path().join("App.config");
    let summary = rewrite_redirects(&config, true, &bin, &extractor, &mut NullReporter).unwrap();
    assert_eq!(summary.inserted, 2);

    let doc = Document::load(&config).unwrap();
    let runtime = doc.root.child_element("runtime").unwrap();
    let binding = runtime.child_element("assemblyBinding").unwrap();
    let cultures: Vec<Option<String>> = binding
        .elements()
        .map(|entry| {
            entry
                .child_element("assemblyIdentity")
                .unwrap()
                .attr("culture")
                .map(str::to_string)
        })
        .collect();

    assert_eq!(cultures, vec![None, Some("de-DE".to_string())]);
}

#[test]
fn reporter_sees_every_outcome() {
    struct Recording(Vec<(PathBuf, &'static str)>);

    impl Reporter for Recording {
        fn report(&mut self, event: &ScanEvent<'_>) {
            let (path, kind) = match event {
                ScanEvent::Ignored { path } => (*path, "ignored"),
                ScanEvent::NoIdentity { path } => (*path, "no-identity"),
                ScanEvent::Unreadable { path, .. } => (*path, "unreadable"),
                ScanEvent::Unsigned { path, .. } => (*path, "unsigned"),
                ScanEvent::Merged { path, action, .. } => match action {
                    MergeAction::Skipped => (*path, "kept"),
                    MergeAction::Updated => (*path, "updated"),
                    MergeAction::Inserted => (*path, "inserted"),
                },
            };
            self.0.push((path.to_path_buf(), kind));
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("bin");
    fs::create_dir(&bin).unwrap();
    touch(&bin, "a.dll");
    touch(&bin, "b.dll");
    touch(&bin, "c.dll");
    touch(&bin, "d.txt");

    let extractor = StubExtractor::new()
        .with("a.dll", signed("A", AssemblyVersion::new(1, 0, 0, 0), None))
        .with("b.dll", unsigned("B"));

    let config = dir.path().join("App.config");
    let mut reporter = Recording(Vec::new());
    rewrite_redirects(&config, true, &bin, &extractor, &mut reporter).unwrap();

    let kinds: Vec<&str> = reporter.0.iter().map(|(_, kind)| *kind).collect();
    assert_eq!(kinds, vec!["inserted", "unsigned", "no-identity", "ignored"]);
    assert!(reporter.0[0].0.ends_with("a.dll"));
}

#[test]
fn unreadable_file_is_skipped_and_the_rest_still_lands() {
    struct FailsOn {
        inner: StubExtractor,
        name: &'static str,
    }

    impl IdentityExtractor for FailsOn {
        fn applies_to(&self, path: &Path) -> bool {
            self.inner.applies_to(path)
        }

        fn extract(&self, path: &Path) -> Result<Option<AssemblyIdentity>> {
            if path.file_name().and_then(|name| name.to_str()) == Some(self.name) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked").into());
            }
            self.inner.extract(path)
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("bin");
    fs::create_dir(&bin).unwrap();
    touch(&bin, "Denied.dll");
    touch(&bin, "Lib.dll");

    let extractor = FailsOn {
        inner: StubExtractor::new().with(
            "Lib.dll",
            signed("Lib", AssemblyVersion::new(1, 0, 0, 0), None),
        ),
        name: "Denied.dll",
    };

    let config = dir.path().join("App.config");
    let summary = rewrite_redirects(&config, true, &bin, &extractor, &mut NullReporter).unwrap();

    assert_eq!(summary.unreadable, 1);
    assert_eq!(summary.inserted, 1);

    let doc = Document::load(&config).unwrap();
    entry_for(&doc, "Lib");
}

#[test]
fn malformed_config_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("bin");
    fs::create_dir(&bin).unwrap();

    let config = dir.path().join("App.config");
    fs::write(&config, "<configuration><runtime></configuration>").unwrap();

    let result = rewrite_redirects(
        &config,
        true,
        &bin,
        &StubExtractor::new(),
        &mut NullReporter,
    );
    assert!(result.is_err());
}
