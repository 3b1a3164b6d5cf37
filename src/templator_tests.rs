//! End-to-end render tests
//!
//! Compile, cache and render through `Templator`, the way an application
//! drives it.

#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::path::Path;
    use std::time::{Duration, SystemTime};

    use serde::Serialize;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    use crate::templator::DEPENDENCY_FILE;
    use crate::{DirectiveRegistry, Finder, TemplateError, Templator, TemplatorConfig, ViewCache};

    fn fixture(files: &[(&str, &str)]) -> (TempDir, Templator) {
        let dir = TempDir::new().unwrap();
        write_files(dir.path(), files);
        let finder = Finder::new(vec![dir.path().to_path_buf()]);
        let cache = ViewCache::new(dir.path().join("cache"));
        (dir, Templator::new(finder, cache))
    }

    fn write_files(root: &Path, files: &[(&str, &str)]) {
        for (name, content) in files {
            let path = root.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, content).unwrap();
        }
    }

    fn render(source: &str, data: Value) -> crate::Result<String> {
        let (_dir, mut templator) = fixture(&[("view.html", source)]);
        templator.render("view", &data, false)
    }

    fn touch_later(path: &Path) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(120))
            .unwrap();
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // RENDERING
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_foreach_numbers() {
        let (_dir, mut templator) = fixture(&[(
            "numbers.html",
            "{% foreach ($numbers as $number) %}{{ $number }}{% endforeach %}",
        )]);

        let compiled = templator.compile("numbers").unwrap();
        assert_eq!(
            compiled,
            "{@ foreach ($numbers as $number): @}{@ echo escape($number); @}{@ endforeach; @}"
        );
        assert_eq!(
            templator
                .render("numbers", &json!({"numbers": [1, 2, 3]}), true)
                .unwrap(),
            "123"
        );
    }

    #[test]
    fn test_escaping_rules() {
        let data = json!({"html": "<script>"});
        assert_eq!(render("{{ $html }}", data.clone()).unwrap(), "&lt;script&gt;");
        assert_eq!(render("{{ '<script>' }}", data.clone()).unwrap(), "&lt;script&gt;");
        assert_eq!(render("{!! $html !!}", data).unwrap(), "<script>");
    }

    #[test]
    fn test_inline_section_is_escaped() {
        let (_dir, mut templator) = fixture(&[
            ("layout.html", "<title>{% yield('title') %}</title>"),
            ("page.html", "{% extend('layout') %}{% section('title', '<script>') %}"),
        ]);
        assert_eq!(
            templator.render("page", &json!({}), false).unwrap(),
            "<title>&lt;script&gt;</title>"
        );
    }

    #[test]
    fn test_layout_page_render() {
        let (_dir, mut templator) = fixture(&[
            (
                "layouts/app.html",
                "<title>{% yield('title', 'Untitled') %}</title><main>{% yield('content') %}</main>",
            ),
            (
                "home.html",
                "{% extend('layouts/app') %}{% section('content') %}<p>Hi {{ $user->name }}</p>{% endsection %}",
            ),
        ]);
        let html = templator
            .render("home", &json!({"user": {"name": "Ann & Bo"}}), true)
            .unwrap();
        assert_eq!(html, "<title>Untitled</title><main><p>Hi Ann &amp; Bo</p></main>");
    }

    #[test]
    fn test_include_shares_caller_scope() {
        let (_dir, mut templator) = fixture(&[
            ("greet.html", "Hi {{ $who }}"),
            ("page.html", "{% set $who = 'Bo' %}{% include('greet') %}!"),
        ]);
        assert_eq!(templator.render("page", &(), false).unwrap(), "Hi Bo!");
    }

    #[test]
    fn test_component_render() {
        let (_dir, mut templator) = fixture(&[
            (
                "components/alert.html",
                "<div class=\"alert\"><b>{% yield('title') %}</b>{% yield('content') %}</div>",
            ),
            (
                "page.html",
                "{% component('alert', title: 'Heads <up>') %}{{ $message }}{% endcomponent %}",
            ),
        ]);
        let mut templator = templator.with_component_namespace("components/");
        assert_eq!(
            templator
                .render("page", &json!({"message": "a < b"}), false)
                .unwrap(),
            "<div class=\"alert\"><b>Heads &lt;up&gt;</b>a &lt; b</div>"
        );
    }

    #[test]
    fn test_conditionals() {
        let source = "{% if ($n > 10) %}big{% elseif ($n > 5) %}mid{% else %}small{% endif %}";
        assert_eq!(render(source, json!({"n": 20})).unwrap(), "big");
        assert_eq!(render(source, json!({"n": 7})).unwrap(), "mid");
        assert_eq!(render(source, json!({"n": 1})).unwrap(), "small");
    }

    #[test]
    fn test_loop_control() {
        let source = concat!(
            "{% foreach ($xs as $x) %}",
            "{% if ($x == 4) %}{% break %}{% endif %}",
            "{% if ($x == 1) %}{% continue %}{% endif %}",
            "{{ $x }}",
            "{% endforeach %}",
        );
        assert_eq!(render(source, json!({"xs": [1, 2, 3, 4, 5]})).unwrap(), "23");
    }

    #[test]
    fn test_foreach_key_value_over_map() {
        let source = "{% foreach $prices as $item => $price %}{{ $item }}={{ $price }};{% endforeach %}";
        assert_eq!(
            render(source, json!({"prices": {"tea": 2, "cake": 3.5}})).unwrap(),
            "cake=3.5;tea=2;"
        );
    }

    #[test]
    fn test_set_and_expressions() {
        let source = concat!(
            "{% set $total = $a * 2 + 1 %}",
            "{{ $total }}|",
            "{{ upper($name) . '!' }}|",
            "{{ $items->count() }}|",
            "{{ $missing ?? 'none' }}|",
            "{{ isset($user->email) ? 'yes' : 'no' }}|",
            "{{ $flag }}",
        );
        let data = json!({"a": 4, "name": "ann", "items": [1, 2], "user": {}, "flag": true});
        assert_eq!(render(source, data).unwrap(), "9|ANN!|2|none|no|true");
    }

    #[test]
    fn test_data_context_variable() {
        assert_eq!(
            render("{{ $__['name'] }}/{{ count($__) }}", json!({"name": "Ann", "x": 1})).unwrap(),
            "Ann/2"
        );
    }

    #[test]
    fn test_serializable_struct_as_data() {
        #[derive(Serialize)]
        struct Page<'a> {
            title: &'a str,
            tags: Vec<&'a str>,
        }

        let (_dir, mut templator) = fixture(&[(
            "page.html",
            "<h1>{{ $title }}</h1>{{ join(', ', $tags) }}",
        )]);
        let page = Page {
            title: "News",
            tags: vec!["a", "b"],
        };
        assert_eq!(
            templator.render("page", &page, false).unwrap(),
            "<h1>News</h1>a, b"
        );
    }

    #[test]
    fn test_json_output_is_html_safe() {
        assert_eq!(
            render("{% json($data) %}", json!({"data": {"a": "<b>&'\""}})).unwrap(),
            r#"{"a":"\u003Cb\u003E\u0026\u0027\u0022"}"#
        );
    }

    #[test]
    fn test_raw_block_renders_verbatim() {
        assert_eq!(
            render("{% raw %}{{ $x }} {% if %} @}{% endraw %}", json!({})).unwrap(),
            "{{ $x }} {% if %} @}"
        );
    }

    #[test]
    fn test_code_opener_in_text_renders_verbatim() {
        assert_eq!(
            render("Email {@admin} now", json!({})).unwrap(),
            "Email {@admin} now"
        );
        assert_eq!(
            render("a {@ b {{ $c }}", json!({"c": "<i>"})).unwrap(),
            "a {@ b &lt;i&gt;"
        );
    }

    #[test]
    fn test_placeholder_lookalikes_render_verbatim() {
        assert_eq!(
            render("{% raw %}X{% endraw %} __TEMPLATOR_RAW_0__", json!({})).unwrap(),
            "X __TEMPLATOR_RAW_0__"
        );
        assert_eq!(
            render("{% raw %}X{% endraw %}|\u{1}TEMPLATOR_RAW_0\u{1}", json!({})).unwrap(),
            "X|\u{1}TEMPLATOR_RAW_0\u{1}"
        );
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // RENDER ERRORS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_failed_render_returns_only_an_error() {
        let err = render("before {{ $missing }} after", json!({})).unwrap_err();
        assert!(matches!(err, TemplateError::Render { ref message } if message.contains("$missing")));
    }

    #[test]
    fn test_data_must_be_a_map() {
        assert!(matches!(
            render("x", json!([1, 2])).unwrap_err(),
            TemplateError::Render { .. }
        ));
        assert_eq!(render("x", Value::Null).unwrap(), "x");
    }

    #[test]
    fn test_missing_template() {
        let (_dir, mut templator) = fixture(&[]);
        assert!(matches!(
            templator.render("ghost", &json!({}), true).unwrap_err(),
            TemplateError::TemplateNotFound { ref name } if name == "ghost"
        ));
        assert!(!templator.view_exist("ghost"));
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // DIRECTIVES
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_custom_directive() {
        let (_dir, mut templator) = fixture(&[("sum.html", "{% sum(1, 2) %}")]);
        templator
            .directives()
            .register("sum", |args| {
                Ok(json!(args.iter().filter_map(Value::as_i64).sum::<i64>()))
            })
            .unwrap();

        assert_eq!(templator.render("sum", &(), false).unwrap(), "3");
    }

    #[test]
    fn test_reserved_directive_name() {
        let registry = DirectiveRegistry::new();
        assert!(matches!(
            registry.register("include", |_| Ok(Value::Null)).unwrap_err(),
            TemplateError::DirectiveReserved { ref name } if name == "include"
        ));
    }

    #[test]
    fn test_unregistered_directive_fails_at_render() {
        let (_dir, mut templator) = fixture(&[("page.html", "{% missing(1) %}")]);
        assert!(templator.compile("page").is_ok());
        assert!(matches!(
            templator.render("page", &(), false).unwrap_err(),
            TemplateError::DirectiveNotRegistered { ref name } if name == "missing"
        ));
    }

    #[test]
    fn test_shared_registry_and_imports() {
        let registry = DirectiveRegistry::new();
        registry
            .register("slug", |args| {
                let text = args.first().and_then(Value::as_str).unwrap_or_default();
                Ok(json!(text.to_lowercase().replace(' ', "-")))
            })
            .unwrap();

        let (_dir, templator) = fixture(&[(
            "post.html",
            r"{% use('App\Text\slug as S') %}{{ S($title) }}|{% slug('A B') %}",
        )]);
        let mut templator = templator.with_directives(registry.clone());
        assert!(templator.directives().has("slug"));
        assert_eq!(
            templator
                .render("post", &json!({"title": "Hello World"}), false)
                .unwrap(),
            "hello-world|a-b"
        );
    }

    #[test]
    fn test_directive_error_is_reported() {
        let (_dir, mut templator) = fixture(&[("page.html", "{% fail() %}")]);
        templator
            .directives()
            .register("fail", |_| Err("nope".to_string()))
            .unwrap();
        assert!(matches!(
            templator.render("page", &(), false).unwrap_err(),
            TemplateError::Directive { ref name, ref message } if name == "fail" && message == "nope"
        ));
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // CACHE
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_cached_and_uncached_renders_match() {
        let (_dir, mut templator) = fixture(&[
            ("nav.html", "<nav>{{ $page }}</nav>"),
            ("page.html", "{% include('nav') %}<p>{{ $body }}</p>"),
        ]);
        let data = json!({"page": "home", "body": "text"});

        let fresh = templator.render("page", &data, false).unwrap();
        let first = templator.render("page", &data, true).unwrap();
        let second = templator.render("page", &data, true).unwrap();
        assert_eq!(fresh, "<nav>home</nav><p>text</p>");
        assert_eq!(first, fresh);
        assert_eq!(second, fresh);
    }

    #[test]
    fn test_cache_hit_skips_compile() {
        let (_dir, mut templator) = fixture(&[("page.html", "real")]);
        templator.compile("page").unwrap();

        // A hand-edited artifact is served as long as it is fresh.
        let cached = templator.compiled_path("page");
        fs::write(&cached, "from cache").unwrap();
        touch_later(&cached);

        assert_eq!(templator.render("page", &(), true).unwrap(), "from cache");
        assert_eq!(templator.render("page", &(), false).unwrap(), "real");
    }

    #[test]
    fn test_modified_dependency_triggers_recompile() {
        let (dir, mut templator) = fixture(&[
            ("nav.html", "old"),
            ("page.html", "[{% include('nav') %}]"),
        ]);
        assert_eq!(templator.render("page", &(), true).unwrap(), "[old]");

        let nav = dir.path().join("nav.html");
        fs::write(&nav, "new").unwrap();
        touch_later(&nav);

        assert_eq!(templator.render("page", &(), true).unwrap(), "[new]");
    }

    #[test]
    fn test_compile_records_dependencies_under_source_path() {
        let (dir, mut templator) = fixture(&[
            ("nav.html", "n"),
            ("page.html", "{% include('nav') %}"),
        ]);
        templator.compile("page").unwrap();

        let session = dir.path().join("page.html").to_string_lossy().into_owned();
        let deps = templator.get_dependency(&session);
        assert_eq!(deps.get(&dir.path().join("nav.html")), Some(&1));
    }

    #[test]
    fn test_manual_dependencies() {
        let (_dir, mut templator) = fixture(&[]);
        templator.add_dependency("s", "/views/a.html", 1);

        let mut batch = crate::Dependencies::new();
        batch.insert("/views/a.html".into(), 3);
        batch.insert("/views/b.html".into(), 2);
        templator.prepend_dependency("s", &batch);

        let deps = templator.get_dependency("s");
        assert_eq!(deps.get(Path::new("/views/a.html")), Some(&3));
        assert_eq!(deps.get(Path::new("/views/b.html")), Some(&2));
    }

    #[test]
    fn test_clear_cache() {
        let (_dir, mut templator) = fixture(&[("a.html", "a"), ("b.html", "b")]);
        templator.compile("a").unwrap();
        templator.compile("b").unwrap();
        assert!(templator.compiled_path("a").exists());

        assert_eq!(templator.clear_cache().unwrap(), 2);
        assert!(!templator.compiled_path("a").exists());
        assert!(templator.dependencies().is_empty());
    }

    #[test]
    fn test_config_persists_dependency_graph() {
        let dir = TempDir::new().unwrap();
        write_files(
            dir.path(),
            &[("nav.html", "n"), ("page.html", "{% include('nav') %}")],
        );
        let config = TemplatorConfig {
            view_paths: vec![dir.path().to_path_buf()],
            cache_path: dir.path().join("cache"),
            ..TemplatorConfig::default()
        };
        let session = dir.path().join("page.html").to_string_lossy().into_owned();

        let mut templator = Templator::from_config(&config);
        templator.compile("page").unwrap();
        assert!(config.cache_path.join(DEPENDENCY_FILE).exists());

        // A new instance picks up the graph and can serve the cached artifact.
        let mut restarted = Templator::from_config(&config);
        assert_eq!(
            restarted.get_dependency(&session).get(&dir.path().join("nav.html")),
            Some(&1)
        );
        assert_eq!(restarted.render("page", &(), true).unwrap(), "n");
    }

    #[test]
    fn test_without_persistence_a_restart_recompiles() {
        let (dir, mut templator) = fixture(&[("page.html", "v1")]);
        templator.compile("page").unwrap();

        let cached = templator.compiled_path("page");
        fs::write(&cached, "stale").unwrap();
        touch_later(&cached);

        let finder = Finder::new(vec![dir.path().to_path_buf()]);
        let mut restarted = Templator::new(finder, ViewCache::new(dir.path().join("cache")));
        assert_eq!(restarted.render("page", &(), true).unwrap(), "v1");
        assert!(!dir.path().join("cache").join(DEPENDENCY_FILE).exists());
    }
}
