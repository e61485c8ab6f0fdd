//! Single-command behaviour against a real temp directory and the in-memory
//! registry.

mod common;

use std::fs;

use common::{exec, project_with_process, var, TestProject};

use inibake_core::log::LogState;

fn project() -> TestProject {
    project_with_process("Echo,idle")
}

// ---------------------------------------------------------------------------
// Files and directories
// ---------------------------------------------------------------------------

#[test]
fn test_file_copy_with_wildcard_and_preserve() {
    let project = project();
    fs::create_dir_all(project.file("src/nested")).unwrap();
    fs::write(project.file("src/a.txt"), "a").unwrap();
    fs::write(project.file("src/b.txt"), "b").unwrap();
    fs::write(project.file("src/skip.ini"), "x").unwrap();
    fs::write(project.file("src/nested/c.txt"), "c").unwrap();
    let mut state = project.engine();

    let line = format!("FileCopy,{}/*.txt,{}", project.operand("src"), project.operand("out"));
    let entries = exec(&mut state, &line);
    assert_eq!(entries.len(), 3, "{:?}", entries);
    assert!(project.file("out/a.txt").is_file());
    assert!(project.file("out/nested/c.txt").is_file());
    assert!(!project.file("out/skip.ini").exists());

    let preserve = format!("FileCopy,{},{},PRESERVE", project.operand("src/a.txt"), project.operand("out/b.txt"));
    let entries = exec(&mut state, &preserve);
    assert_eq!(entries[0].state, LogState::Warning);
    assert_eq!(fs::read_to_string(project.file("out/b.txt")).unwrap(), "b");

    let overwrite = format!("FileCopy,{},{}", project.operand("src/a.txt"), project.operand("out/b.txt"));
    let entries = exec(&mut state, &overwrite);
    assert_eq!(entries[0].state, LogState::Overwrite);
    assert_eq!(fs::read_to_string(project.file("out/b.txt")).unwrap(), "a");
}

#[test]
fn test_file_copy_norec_stays_flat() {
    let project = project();
    fs::create_dir_all(project.file("src/nested")).unwrap();
    fs::write(project.file("src/a.txt"), "a").unwrap();
    fs::write(project.file("src/nested/c.txt"), "c").unwrap();
    let mut state = project.engine();

    let line = format!("FileCopy,{}/*.txt,{},NOREC", project.operand("src"), project.operand("out"));
    exec(&mut state, &line);
    assert!(project.file("out/a.txt").is_file());
    assert!(!project.file("out/nested").exists());
}

#[test]
fn test_file_delete_missing_warns_unless_nowarn() {
    let project = project();
    let mut state = project.engine();
    let missing = project.operand("missing.txt");

    let entries = exec(&mut state, &format!("FileDelete,{}", missing));
    assert_eq!(entries[0].state, LogState::Warning);
    let entries = exec(&mut state, &format!("FileDelete,{},NOWARN", missing));
    assert_eq!(entries[0].state, LogState::Ignore);
}

#[test]
fn test_blank_file_size_and_rename() {
    let project = project();
    let mut state = project.engine();
    let blank = project.operand("made/blank.txt");

    exec(&mut state, &format!("FileCreateBlank,{}", blank));
    assert!(project.file("made/blank.txt").is_file());
    exec(&mut state, &format!("FileSize,{},%Size%", blank));
    assert_eq!(var(&state, "Size"), "0");

    let renamed = project.operand("made/renamed.txt");
    exec(&mut state, &format!("FileRename,{},{}", blank, renamed));
    assert!(project.file("made/renamed.txt").is_file());
    assert!(!project.file("made/blank.txt").exists());
}

#[test]
fn test_directory_commands() {
    let project = project();
    let mut state = project.engine();

    exec(&mut state, &format!("DirMake,{}", project.operand("tree/inner")));
    fs::write(project.file("tree/inner/data.bin"), [0u8; 10]).unwrap();
    fs::write(project.file("tree/top.bin"), [0u8; 5]).unwrap();

    let entries = exec(&mut state, &format!("DirMake,{}", project.operand("tree")));
    assert_eq!(entries[0].state, LogState::Ignore);

    exec(&mut state, &format!("DirSize,{},%Bytes%", project.operand("tree")));
    assert_eq!(var(&state, "Bytes"), "15");

    exec(&mut state, &format!("DirCopy,{},{}", project.operand("tree"), project.operand("backup")));
    assert!(project.file("backup/tree/inner/data.bin").is_file());

    exec(&mut state, &format!("DirMove,{},{}", project.operand("backup/tree"), project.operand("moved")));
    assert!(project.file("moved/inner/data.bin").is_file());

    exec(&mut state, &format!("DirDelete,{}", project.operand("tree")));
    assert!(!project.file("tree").exists());
    let entries = exec(&mut state, &format!("DirDelete,{}", project.operand("tree")));
    assert_eq!(entries[0].state, LogState::Warning);
}

// ---------------------------------------------------------------------------
// Text and INI files
// ---------------------------------------------------------------------------

#[test]
fn test_text_line_commands() {
    let project = project();
    let mut state = project.engine();
    let file = project.operand("notes.txt");

    exec(&mut state, &format!("TXTAddLine,{},first line,Append", file));
    exec(&mut state, &format!("TXTAddLine,{},zero,Prepend", file));
    exec(&mut state, &format!("TXTAddLine,{},,Append", file));
    exec(&mut state, &format!("TXTAddLine,{},LAST,Append", file));
    assert_eq!(
        fs::read_to_string(project.file("notes.txt")).unwrap(),
        "zero\nfirst line\n\nLAST\n"
    );

    exec(&mut state, &format!("TXTDelLine,{},FIRST", file));
    exec(&mut state, &format!("TXTDelEmptyLines,{}", file));
    exec(&mut state, &format!("TXTReplace,{},last,end", file));
    assert_eq!(fs::read_to_string(project.file("notes.txt")).unwrap(), "zero\nend\n");
}

#[test]
fn test_ini_commands() {
    let project = project();
    let mut state = project.engine();
    let file = project.operand("settings.ini");

    let entries = exec(&mut state, &format!("IniWrite,{},Display,Width,800", file));
    assert_eq!(entries[0].state, LogState::Success);
    let entries = exec(&mut state, &format!("IniWrite,{},Display,Width,1024", file));
    assert_eq!(entries[0].state, LogState::Overwrite);

    exec(&mut state, &format!("IniRead,{},Display,Width,%W%", file));
    assert_eq!(var(&state, "W"), "1024");

    exec(&mut state, &format!("IniRead,{},Display,Height,%H%,600", file));
    assert_eq!(var(&state, "H"), "600");

    let entries = exec(&mut state, &format!("IniRead,{},Display,Depth,%D%", file));
    assert_eq!(entries[0].state, LogState::Error);

    exec(&mut state, &format!("IniAddSection,{},Extra", file));
    let entries = exec(&mut state, &format!("IniAddSection,{},extra", file));
    assert_eq!(entries[0].state, LogState::Ignore);

    exec(&mut state, &format!("IniDelete,{},Display,Width", file));
    exec(&mut state, &format!("IniDeleteSection,{},Extra", file));
    let text = fs::read_to_string(project.file("settings.ini")).unwrap();
    assert!(text.contains("[Display]"));
    assert!(!text.contains("Width"));
    assert!(!text.contains("[Extra]"));
}

#[test]
fn test_values_with_commas_survive_assignment() {
    let project = project();
    let mut state = project.engine();
    let file = project.operand("list.ini");
    fs::write(project.file("list.ini"), "[S]\nItems=a,b,c\n").unwrap();

    exec(&mut state, &format!("IniRead,{},S,Items,%Items%", file));
    assert_eq!(var(&state, "Items"), "a,b,c");
    exec(&mut state, "StrFormat,Split,%Items%,#$c,2,%Second%");
    assert_eq!(var(&state, "Second"), "b");
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[test]
fn test_registry_write_read_delete() {
    let project = project();
    let mut state = project.engine();

    let entries = exec(&mut state, "RegWrite,HKLM,REG_SZ,Software\\Demo,Name,Value");
    assert_eq!(entries[0].state, LogState::Success);
    let entries = exec(&mut state, "RegWrite,HKLM,REG_SZ,Software\\Demo,Name,Other");
    assert_eq!(entries[0].state, LogState::Overwrite);

    exec(&mut state, "RegRead,HKLM,Software\\Demo,Name,%Out%");
    assert_eq!(var(&state, "Out"), "Other");

    exec(&mut state, "RegWrite,HKLM,REG_DWORD,Software\\Demo,Count,0x20");
    exec(&mut state, "RegRead,HKLM,Software\\Demo,Count,%Count%");
    assert_eq!(var(&state, "Count"), "32");

    exec(&mut state, "RegWrite,HKLM,REG_BINARY,Software\\Demo,Blob,01,FF");
    exec(&mut state, "RegRead,HKLM,Software\\Demo,Blob,%Blob%");
    assert_eq!(var(&state, "Blob"), "01,FF");

    exec(&mut state, "RegDelete,HKLM,Software\\Demo,Name");
    let entries = exec(&mut state, "RegRead,HKLM,Software\\Demo,Name,%Gone%");
    assert_eq!(entries[0].state, LogState::Error);

    let entries = exec(&mut state, "RegDelete,HKLM,Software\\Demo");
    assert_eq!(entries[0].state, LogState::Success);
    let entries = exec(&mut state, "If,ExistRegSection,HKLM,Software\\Demo,Echo,still there");
    assert_eq!(entries[0].state, LogState::Ignore);
}

#[test]
fn test_registry_multi_string_editing() {
    let project = project();
    let mut state = project.engine();

    exec(&mut state, "RegWrite,HKCU,REG_MULTI_SZ,Env,Path,a,b");
    exec(&mut state, "RegMulti,HKCU,Env,Path,Append,c");
    exec(&mut state, "RegMulti,HKCU,Env,Path,Prepend,b");
    exec(&mut state, "RegMulti,HKCU,Env,Path,Index,c,%Idx%");
    assert_eq!(var(&state, "Idx"), "3");

    exec(&mut state, "RegMulti,HKCU,Env,Path,Delete,a");
    exec(&mut state, "RegRead,HKCU,Env,Path,%Packed%");
    assert_eq!(var(&state, "Packed"), "b#$zc");

    let entries = exec(&mut state, "RegMulti,HKCU,Env,Path,Delete,zzz");
    assert_eq!(entries[0].state, LogState::Error);
    let entries = exec(&mut state, "If,ExistRegMulti,HKCU,Env,Path,c,Echo,found");
    assert_eq!(entries[0].state, LogState::Success);
}

#[test]
fn test_invalid_hive_is_an_error() {
    let project = project();
    let mut state = project.engine();
    let entries = exec(&mut state, "RegWrite,HKXX,REG_SZ,Key,Name,Value");
    assert_eq!(entries[0].state, LogState::Error);
    assert!(entries[0].message.contains("HKXX"));
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

#[test]
fn test_encode_then_extract() {
    let project = project();
    let payload: Vec<u8> = (0u8..=255).cycle().take(10_000).collect();
    fs::write(project.file("payload.bin"), &payload).unwrap();
    let mut state = project.engine();
    let script = project.operand("script.project");

    let entries = exec(&mut state, &format!("Encode,{},Files,{}", script, project.operand("payload.bin")));
    assert_eq!(entries[0].state, LogState::Success, "{:?}", entries);

    let text = fs::read_to_string(project.file("script.project")).unwrap();
    assert!(text.contains("[EncodedFolders]\nFiles"));
    assert!(text.contains("[Files]\npayload.bin=10000,"));
    assert!(text.contains("[EncodedFile-Files-payload.bin]\nlineCount="));
    assert!(text.contains("[Process]\nEcho,idle"));

    exec(&mut state, &format!("ExtractFile,{},Files,payload.bin,{}", script, project.operand("out")));
    assert_eq!(fs::read(project.file("out/payload.bin")).unwrap(), payload);

    let entries = exec(&mut state, &format!("ExtractFile,{},Files,absent.bin,{}", script, project.operand("out")));
    assert_eq!(entries[0].state, LogState::Error);
}

// ---------------------------------------------------------------------------
// Strings, math and parameters
// ---------------------------------------------------------------------------

#[test]
fn test_string_and_math_commands() {
    let project = project();
    let mut state = project.engine();

    exec(&mut state, "StrFormat,UCase,abc,%U%");
    assert_eq!(var(&state, "U"), "ABC");
    exec(&mut state, "StrFormat,Replace,Hello World,world,There,%R%");
    assert_eq!(var(&state, "R"), "Hello There");
    exec(&mut state, "StrFormat,ReplaceX,Hello World,world,There,%RX%");
    assert_eq!(var(&state, "RX"), "Hello World");
    exec(&mut state, "StrFormat,Pos,inibake,BAKE,%P%");
    assert_eq!(var(&state, "P"), "4");

    exec(&mut state, "Set,%N%,5");
    exec(&mut state, "StrFormat,Inc,%N%,3");
    assert_eq!(var(&state, "N"), "8");
    exec(&mut state, "Math,Mul,%M%,%N%,-2");
    assert_eq!(var(&state, "M"), "-16");

    let entries = exec(&mut state, "Math,Div,%Z%,1,0");
    assert_eq!(entries[0].state, LogState::Error);
    assert!(entries[0].message.contains("Division by zero"));
}

#[test]
fn test_percent_in_result_reads_back_literally() {
    let project = project();
    let mut state = project.engine();
    exec(&mut state, "Set,%Greeting%,hi");
    exec(&mut state, "StrFormat,LCase,50#$p OFF %Greeting%,%Out%");
    assert_eq!(var(&state, "Out"), "50% off hi");
}

#[test]
fn test_echo_and_message_levels() {
    let project = project();
    let mut state = project.engine();

    assert_eq!(exec(&mut state, "Echo,plain")[0].state, LogState::Success);
    assert_eq!(exec(&mut state, "Echo,careful,WARN")[0].state, LogState::Warning);
    assert_eq!(exec(&mut state, "Message,oops,Error")[0].state, LogState::Warning);
    assert_eq!(exec(&mut state, "Message,hi,Information,5")[0].state, LogState::Success);
    assert_eq!(exec(&mut state, "Message,hi,Sparkles")[0].state, LogState::Error);
    assert_eq!(exec(&mut state, "Beep,Asterisk")[0].state, LogState::Success);
}
