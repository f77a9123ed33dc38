//! Flowscope CLI - анализ исходника и интерактивная оболочка.
//!
//! Использование:
//!   flowscope                 - запустить REPL
//!   flowscope <file>          - проанализировать файл
//!   flowscope -e "<src>"      - проанализировать строку
//!   flowscope --json ...      - вывести результат в JSON
//!   flowscope --help          - справка

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::env;
use std::fs;
use std::process;

use flowscope::{CompilationResult, Compiler, CompilerOptions};

const VERSION: &str = env!("CARGO_PKG_VERSION");

const HELP: &str = r#"
Flowscope - static analysis for a small C-like language

USAGE:
    flowscope                      Start REPL (interactive mode)
    flowscope <file>               Analyze a source file
    flowscope -e "<source>"        Analyze inline source
    flowscope --help, -h           Show this help
    flowscope --version, -v        Show version

OPTIONS:
    --json                         Print the full result as JSON
    --options <file.json>          Read compiler options from a JSON file

REPL COMMANDS:
    :help, :h                      Show help
    :quit, :q, :exit               Exit REPL
    :clear, :c                     Clear screen
    :load <file>                   Analyze a file
    :tokens                        Show tokens of the last input
    :tree                          Show parse tree of the last input
    :scopes                        Show scopes of the last input
    :flow                          Show control flow of the last input
    :complexity                    Show complexity of the last input
    :json                          Show the last result as JSON

EXAMPLES:
    flowscope -e "for (let i = 0; i < n; i++) { s += i; }"
    flowscope --json program.fs
    RUST_LOG=debug flowscope program.fs
"#;

/// Разобранные аргументы командной строки.
struct Cli {
    json: bool,
    options: CompilerOptions,
    positional: Vec<String>,
}

fn main() {
    env_logger::init();

    let cli = match parse_args(env::args().skip(1).collect()) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("Use --help for usage information.");
            process::exit(1);
        }
    };
    let compiler = Compiler::new(cli.options);

    match cli.positional.as_slice() {
        [] => run_repl(&compiler),
        [flag] if flag == "--help" || flag == "-h" => println!("{}", HELP),
        [flag] if flag == "--version" || flag == "-v" => println!("Flowscope {}", VERSION),
        [flag, source] if flag == "-e" || flag == "--eval" => {
            let result = compiler.compile(source);
            finish(&result, cli.json);
        }
        [file] => {
            let source = match fs::read_to_string(file) {
                Ok(content) => content,
                Err(e) => {
                    eprintln!("Error reading file '{}': {}", file, e);
                    process::exit(1);
                }
            };
            let result = compiler.compile(&source);
            finish(&result, cli.json);
        }
        _ => {
            eprintln!("Too many arguments.");
            eprintln!("Use --help for usage information.");
            process::exit(1);
        }
    }
}

fn parse_args(args: Vec<String>) -> Result<Cli, String> {
    let mut cli = Cli {
        json: false,
        options: CompilerOptions::default(),
        positional: Vec::new(),
    };
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--json" => cli.json = true,
            "--options" => {
                let path = args.next().ok_or("--options requires a file path")?;
                let text = fs::read_to_string(&path)
                    .map_err(|e| format!("Error reading options '{}': {}", path, e))?;
                cli.options = CompilerOptions::from_json(&text)
                    .map_err(|e| format!("Invalid options '{}': {}", path, e))?;
            }
            _ => cli.positional.push(arg),
        }
    }
    Ok(cli)
}

/// Напечатать результат и выйти с кодом 1, если есть ошибки.
fn finish(result: &CompilationResult, json: bool) {
    if json {
        match result.to_json() {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Serialization error: {}", e);
                process::exit(1);
            }
        }
    } else {
        print_report(result);
    }
    if result.has_errors() {
        process::exit(1);
    }
}

fn print_report(result: &CompilationResult) {
    for error in &result.errors {
        eprintln!("{}\n", error);
    }
    show_complexity(result);
}

/// Запустить REPL.
fn run_repl(compiler: &Compiler) {
    println!("Flowscope {}", VERSION);
    println!("Type :help for commands, :quit to exit.\n");

    let mut rl = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("Failed to initialize readline: {}", e);
            process::exit(1);
        }
    };

    let history_path = dirs_next::data_dir()
        .map(|p| p.join("flowscope").join("history.txt"))
        .unwrap_or_else(|| std::path::PathBuf::from(".flowscope_history"));

    // Загрузить историю
    let _ = rl.load_history(&history_path);

    let mut last: Option<CompilationResult> = None;

    loop {
        match rl.readline("flowscope> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if line.starts_with(':') {
                    match handle_command(line, compiler, &mut last) {
                        CommandResult::Continue => continue,
                        CommandResult::Exit => break,
                    }
                }

                let result = compiler.compile(line);
                print_report(&result);
                last = Some(result);
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    // Сохранить историю
    if let Some(parent) = history_path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let _ = rl.save_history(&history_path);
}

enum CommandResult {
    Continue,
    Exit,
}

fn handle_command(cmd: &str, compiler: &Compiler, last: &mut Option<CompilationResult>) -> CommandResult {
    let parts: Vec<&str> = cmd.splitn(2, ' ').collect();
    let command = parts[0];
    let arg = parts.get(1).map(|s| s.trim());

    match command {
        ":help" | ":h" => println!("{}", HELP),
        ":quit" | ":q" | ":exit" => return CommandResult::Exit,
        ":clear" | ":c" => print!("\x1B[2J\x1B[1;1H"), // ANSI clear screen
        ":load" | ":l" => match arg {
            Some(path) => match fs::read_to_string(path) {
                Ok(source) => {
                    println!("Analyzing {}...", path);
                    let result = compiler.compile(&source);
                    print_report(&result);
                    *last = Some(result);
                }
                Err(e) => eprintln!("Error reading '{}': {}", path, e),
            },
            None => println!("Usage: :load <file>"),
        },
        ":tokens" | ":tree" | ":scopes" | ":flow" | ":complexity" | ":json" => {
            // С аргументом команда анализирует его, без него последний ввод.
            if let Some(source) = arg.filter(|s| !s.is_empty()) {
                *last = Some(compiler.compile(source));
            }
            match last.as_ref() {
                Some(result) => show(command, result),
                None => println!("Nothing analyzed yet. Enter some code first."),
            }
        }
        _ => {
            println!("Unknown command: {}", command);
            println!("Type :help for available commands.");
        }
    }
    CommandResult::Continue
}

fn show(command: &str, result: &CompilationResult) {
    match command {
        ":tokens" => {
            println!("Tokens ({}):", result.tokens.len());
            for token in &result.tokens {
                println!("  {:>3}:{:<3} {:?} {}", token.line, token.column, token.kind, token.lexeme);
            }
        }
        ":tree" => match &result.parse_tree {
            Some(tree) => print!("{}", tree.outline()),
            None => println!("No parse tree (compilation aborted)."),
        },
        ":scopes" => show_scopes(result),
        ":flow" => match &result.control_flow {
            Some(flow) => print!("{}", flow.outline()),
            None => println!("No control flow (compilation aborted)."),
        },
        ":complexity" => show_complexity(result),
        _ => match result.to_json() {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Serialization error: {}", e),
        },
    }
}

fn show_scopes(result: &CompilationResult) {
    if result.scopes.is_empty() {
        println!("No scopes (compilation aborted).");
        return;
    }
    for scope in result.scopes.iter() {
        let indent = "  ".repeat(scope.depth);
        println!("{}{:?} #{}", indent, scope.kind, scope.id.0);
        for symbol in &scope.symbols {
            println!(
                "{}  {} : {} ({:?}, line {})",
                indent, symbol.name, symbol.ty, symbol.kind, symbol.line
            );
        }
    }
}

fn show_complexity(result: &CompilationResult) {
    match &result.complexity {
        Some(info) => {
            println!("cyclomatic complexity: {}", info.cyclomatic_complexity);
            println!("time:  {}", info.time_complexity);
            println!("space: {}", info.space_complexity);
            println!("max loop depth: {}", info.max_loop_depth);
            if !info.recursive_functions.is_empty() {
                println!("recursive: {}", info.recursive_functions.join(", "));
            }
        }
        None => println!("No complexity estimate (compilation aborted)."),
    }
}
