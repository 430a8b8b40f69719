use msproj_eval::{condition, shredder, Project, ProjectBuilder, ProjectRootElement, ProjectRootElementCache};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn bench<T>(label: &str, iterations: u32, mut f: impl FnMut() -> T) -> (Duration, T) {
    // Warmup
    for _ in 0..5 {
        std::hint::black_box(f());
    }

    let mut total = Duration::ZERO;
    let mut last = None;
    for _ in 0..iterations {
        let start = Instant::now();
        let result = f();
        total += start.elapsed();
        last = Some(result);
    }

    let avg = total / iterations;
    println!("{label:<45} {iterations:>6} iterations   avg {avg:>12.3?}   total {total:>12.3?}");
    (avg, last.unwrap())
}

/// A project with `n` conditional property groups, an import, item
/// definitions and a few hundred items.
fn write_fixture(dir: &Path, n: usize) -> String {
    let mut props = String::from("<Project>\n  <PropertyGroup>\n");
    for i in 0..n {
        props.push_str(&format!("    <Shared{i}>$(Configuration)_{i}</Shared{i}>\n"));
    }
    props.push_str("  </PropertyGroup>\n</Project>\n");
    std::fs::write(dir.join("common.props"), props).unwrap();

    let src = dir.join("src");
    std::fs::create_dir_all(&src).unwrap();
    for i in 0..200 {
        std::fs::write(src.join(format!("file{i}.cs")), "").unwrap();
    }

    let mut project = String::from(
        r#"<Project DefaultTargets="Build">
  <PropertyGroup>
    <Configuration Condition="'$(Configuration)' == ''">Debug</Configuration>
    <Platform Condition="'$(Platform)' == ''">AnyCPU</Platform>
  </PropertyGroup>
  <Import Project="common.props" />
"#,
    );
    for i in 0..n {
        project.push_str(&format!(
            "  <PropertyGroup Condition=\"'$(Configuration)|$(Platform)' == 'Debug|AnyCPU' and {i} &lt; 1000\">\n    <Value{i}>$(Shared{i});$(Value{i})</Value{i}>\n  </PropertyGroup>\n"
        ));
    }
    project.push_str(
        r#"  <ItemDefinitionGroup><Compile><Visible>true</Visible></Compile></ItemDefinitionGroup>
  <ItemGroup>
    <Compile Include="src/**/*.cs" Exclude="src/file1*.cs" />
    <Content Include="@(Compile->'%(Filename).txt')"><Origin>%(Visible)</Origin></Content>
  </ItemGroup>
  <Target Name="Build" />
</Project>
"#,
    );
    std::fs::write(dir.join("app.proj"), &project).unwrap();
    project
}

fn main() {
    let dir = tempfile::tempdir().expect("cannot create a temporary directory");
    let source = write_fixture(dir.path(), 200);
    let project_path = dir.path().join("app.proj");

    let iterations = 200;

    println!("─── Performance: synthetic project ({} bytes) ───", source.len());
    println!();

    // 1. Tree parse (XML + element mapping)
    bench("ProjectRootElement::parse", iterations, || ProjectRootElement::parse(&source).unwrap());

    // 2. roxmltree XML parse only (baseline)
    bench("roxmltree::Document::parse (XML only)", iterations, || {
        roxmltree::Document::parse(&source).unwrap().root_element().children().count()
    });

    // 3. Full evaluation, cold cache each time
    bench("Project::from_file (cold cache)", iterations, || Project::from_file(&project_path).unwrap());

    // 4. Full evaluation sharing one cache
    let cache = Arc::new(ProjectRootElementCache::default());
    bench("Project::from_file (shared cache)", iterations, || {
        ProjectBuilder::new().cache(Arc::clone(&cache)).from_file(&project_path).unwrap()
    });

    // 5. Re-evaluation of an unchanged project
    let mut project = Project::from_file(&project_path).unwrap();
    bench("mark_dirty + reevaluate_if_necessary", iterations, || {
        project.mark_dirty();
        project.reevaluate_if_necessary().unwrap()
    });

    // 6. Condition parsing only (all conditions from the file)
    let root = ProjectRootElement::parse(&source).unwrap();
    let conditions: Vec<String> = root.property_groups().filter_map(|pg| pg.condition.clone()).collect();
    let cond_count = conditions.len();
    bench(&format!("parse all {cond_count} conditions"), iterations, || {
        for cond in &conditions {
            std::hint::black_box(condition::parse_condition(cond).unwrap());
        }
    });

    // 7. Shredding item and metadata references
    let expressions = [
        "@(Compile->'%(Filename).txt')",
        "@(Compile);@(Content, ';');%(Compile.Visible)",
        "a;b;@(x->'%(y)', '|');c",
        "%(Identity)",
        "no references here",
    ];
    bench("shred 5 expressions", iterations * 50, || {
        shredder::get_referenced_item_names_and_metadata(expressions.iter().copied())
    });
    bench("split 5 expressions", iterations * 50, || {
        expressions.iter().map(|e| shredder::split_semicolon_separated_list(e).len()).sum::<usize>()
    });

    println!();
    println!(
        "{} properties, {} items, {} imports",
        project.properties().len(),
        project.items().len(),
        project.imports().len()
    );
    println!("Done.");
}
