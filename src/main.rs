fn main() {
    skill_forge_lib::run()
}
